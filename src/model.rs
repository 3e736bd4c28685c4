//! 发现结果与分类结果的数据模型

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// 发现子域名的途径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    /// DNS区域传送
    ZoneTransfer,
    /// 证书透明度日志
    #[serde(rename = "ct-log")]
    CertificateLog,
    /// 字典暴破
    BruteForce,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoverySource::ZoneTransfer => "zone-transfer",
            DiscoverySource::CertificateLog => "ct-log",
            DiscoverySource::BruteForce => "brute-force",
        };
        f.write_str(name)
    }
}

/// 规范化主机名：去除空白和末尾的点，转为小写
pub fn normalize_hostname(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// 判断主机名是否属于目标域名（以 `.domain` 结尾且不等于域名本身）
pub fn in_scope(domain: &str, hostname: &str) -> bool {
    hostname.len() > domain.len() + 1
        && hostname.ends_with(domain)
        && hostname.as_bytes()[hostname.len() - domain.len() - 1] == b'.'
}

/// 一条被发现的主机名
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredName {
    /// 规范化后的完整主机名
    pub hostname: String,
    /// 贡献了该名称的发现途径
    pub sources: BTreeSet<DiscoverySource>,
    /// 是否在复核阶段重新解析成功
    pub verified: bool,
}

impl DiscoveredName {
    pub fn new(hostname: &str, source: DiscoverySource) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        DiscoveredName {
            hostname: normalize_hostname(hostname),
            sources,
            verified: false,
        }
    }

    /// 以 `*` 开头的泛解析条目
    pub fn is_wildcard(&self) -> bool {
        self.hostname.starts_with('*')
    }
}

/// 字典中的候选标签
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WordlistEntry(String);

impl WordlistEntry {
    pub fn new(label: &str) -> Self {
        WordlistEntry(label.trim().trim_matches('.').to_ascii_lowercase())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    /// 拼接出 `label.domain`
    pub fn candidate(&self, domain: &str) -> String {
        format!("{}.{}", self.0, domain)
    }
}

/// 主机的功能角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 面向用户的站点
    User,
    /// 技术性主机（CDN、数据库、邮件、API等）
    Technical,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Technical => f.write_str("technical"),
        }
    }
}

/// 给出最终角色的分类阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationStage {
    Pattern,
    HttpProbe,
    DnsRecords,
    Default,
}

/// 分类依据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Evidence {
    pub matched_pattern: Option<String>,
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub server: Option<String>,
    pub title: Option<String>,
    pub has_a: bool,
    pub has_cname: bool,
    pub has_mx: bool,
    pub has_txt: bool,
}

/// 单个主机的分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub hostname: String,
    pub role: Role,
    pub stage: ClassificationStage,
    pub evidence: Evidence,
}
