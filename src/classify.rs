//! 子域名角色分类
//!
//! 每个主机按固定顺序只分类一次：
//! 1. 名称模式：先匹配技术类模式，再匹配用户类模式，首个命中即为结果；
//! 2. HTTP探测：200 响应的 HTML 视为用户站点，图片、脚本、样式、字体视为技术主机；
//! 3. DNS记录：有 MX，或只有 TXT 而没有 A/CNAME，视为技术主机；
//! 4. 以上都无法判断时默认为技术主机。

use std::sync::Arc;

use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::dns_resolver::QueryType;
use crate::error::{ReconError, Result};
use crate::model::{ClassificationResult, ClassificationStage, Evidence, Role};
use crate::pool::UnitOutcome;
use crate::state::RunContext;
use crate::verify::{HttpProbe, HttpResponseInfo};

/// 技术类主机的名称模式
pub const TECHNICAL_PATTERNS: &[&str] = &[
    // CDN与静态资源
    r"^cdn[0-9-]*\.",
    r"^s[0-9]+\.",
    r"^scontent",
    r"^content[0-9-]*\.",
    r"^static[0-9-]*\.",
    r"^media[0-9-]*\.",
    r"^img[0-9-]*\.",
    r"^image[0-9-]*\.",
    r"^assets[0-9-]*\.",
    // 数据库
    r"^db[0-9-]*\.",
    r"^database[0-9-]*\.",
    r"^sql[0-9-]*\.",
    r"^mysql[0-9-]*\.",
    r"^postgres[0-9-]*\.",
    r"^mongo[0-9-]*\.",
    // 邮件
    r"^mail[0-9-]*\.",
    r"^smtp[0-9-]*\.",
    r"^pop[0-9-]*\.",
    r"^imap[0-9-]*\.",
    r"^zmail\.",
    r"^relay\.",
    // API与网关
    r"^api[0-9-]*\.",
    r"^ws[0-9-]*\.",
    r"^websocket\.",
    r"^gateway\.",
    // 监控与日志
    r"^monitor\.",
    r"^log[0-9-]*\.",
    r"^stats\.",
    r"^metrics\.",
    // 分片
    r".*-shard[0-9]+\.",
    r"^shard[0-9]+\.",
    // 缓存
    r"^cache[0-9-]*\.",
    r"^redis\.",
    r"^memcache\.",
    // 开发与测试环境
    r"^dev\.",
    r"^test\.",
    r"^staging\.",
    r"^qa\.",
    r"^uat\.",
    // 类IP前缀
    r"^[0-9]+\.[0-9]+\.[0-9]+\.",
];

/// 用户类站点的名称模式
pub const USER_PATTERNS: &[&str] = &[
    r"^www\.",
    r"^app\.",
    r"^m\.",
    r"^mobile\.",
    r"^login\.",
    r"^account\.",
    r"^shop\.",
    r"^store\.",
    r"^blog\.",
    r"^news\.",
    r"^support\.",
    r"^help\.",
    r"^community\.",
    r"^forum\.",
    r"^docs\.",
    r"^dashboard\.",
];

/// 编译好的名称模式，大小写不敏感
#[derive(Debug, Clone)]
pub struct PatternSet {
    technical: Vec<Regex>,
    user: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| ReconError::Configuration(format!("无效的分类模式 {}: {}", p, e)))
        })
        .collect()
}

impl PatternSet {
    pub fn new(technical: &[&str], user: &[&str]) -> Result<Self> {
        Ok(PatternSet {
            technical: compile(technical)?,
            user: compile(user)?,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(TECHNICAL_PATTERNS, USER_PATTERNS)
    }

    /// 技术类模式优先，首个命中的模式决定角色
    pub fn classify(&self, hostname: &str) -> Option<(Role, String)> {
        let technical = self.technical.iter().map(|re| (Role::Technical, re));
        let user = self.user.iter().map(|re| (Role::User, re));
        technical
            .chain(user)
            .find(|(_, re)| re.is_match(hostname))
            .map(|(role, re)| (role, re.as_str().to_string()))
    }
}

/// 依据HTTP响应判断角色，只有 200 响应才有结论
pub fn role_from_http(info: &HttpResponseInfo) -> Option<Role> {
    if info.status != 200 {
        return None;
    }
    let content_type = info.content_type.as_deref()?.to_ascii_lowercase();
    if content_type.contains("text/html") {
        return Some(Role::User);
    }
    let technical = ["image", "javascript", "ecmascript", "css", "font"];
    if technical.iter().any(|marker| content_type.contains(marker)) {
        return Some(Role::Technical);
    }
    None
}

/// 依据DNS记录判断角色
pub fn role_from_dns(evidence: &Evidence) -> Option<Role> {
    if evidence.has_mx {
        return Some(Role::Technical);
    }
    if evidence.has_txt && !evidence.has_a && !evidence.has_cname {
        return Some(Role::Technical);
    }
    None
}

/// 一批主机的分类结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassificationReport {
    pub results: Vec<ClassificationResult>,
}

impl ClassificationReport {
    fn with_role(&self, role: Role) -> Vec<String> {
        let mut names: Vec<String> = self
            .results
            .iter()
            .filter(|r| r.role == role)
            .map(|r| r.hostname.clone())
            .collect();
        names.sort();
        names
    }

    pub fn user(&self) -> Vec<String> {
        self.with_role(Role::User)
    }

    pub fn technical(&self) -> Vec<String> {
        self.with_role(Role::Technical)
    }

    pub fn get(&self, hostname: &str) -> Option<&ClassificationResult> {
        self.results.iter().find(|r| r.hostname == hostname)
    }
}

/// 分类引擎
#[derive(Clone)]
pub struct Classifier {
    patterns: Arc<PatternSet>,
    http: Arc<dyn HttpProbe>,
}

impl Classifier {
    pub fn new(patterns: PatternSet, http: Arc<dyn HttpProbe>) -> Self {
        Classifier {
            patterns: Arc::new(patterns),
            http,
        }
    }

    /// 对单个主机分类，总会给出 user 或 technical
    pub async fn classify_host(&self, ctx: &RunContext, hostname: &str) -> ClassificationResult {
        let mut evidence = Evidence::default();
        let result = |role, stage, evidence| ClassificationResult {
            hostname: hostname.to_string(),
            role,
            stage,
            evidence,
        };

        if let Some((role, pattern)) = self.patterns.classify(hostname) {
            evidence.matched_pattern = Some(pattern);
            return result(role, ClassificationStage::Pattern, evidence);
        }

        if let Some(info) = self.http.probe(hostname).await {
            let role = role_from_http(&info);
            evidence.http_status = Some(info.status);
            evidence.content_type = info.content_type;
            evidence.server = info.server;
            evidence.title = info.title;
            if let Some(role) = role {
                return result(role, ClassificationStage::HttpProbe, evidence);
            }
        }

        let (a, cname, mx, txt) = tokio::join!(
            ctx.lookup(hostname, QueryType::A),
            ctx.lookup(hostname, QueryType::Cname),
            ctx.lookup(hostname, QueryType::Mx),
            ctx.lookup(hostname, QueryType::Txt),
        );
        evidence.has_a = a.is_found();
        evidence.has_cname = cname.is_found();
        evidence.has_mx = mx.is_found();
        evidence.has_txt = txt.is_found();
        if let Some(role) = role_from_dns(&evidence) {
            return result(role, ClassificationStage::DnsRecords, evidence);
        }

        debug!("{} 无法判断，默认为技术主机", hostname);
        result(Role::Technical, ClassificationStage::Default, evidence)
    }

    /// 并发分类一批主机。超时或失败的任务按技术主机处理
    pub async fn classify_all(&self, ctx: &RunContext, hostnames: &[String]) -> ClassificationReport {
        if hostnames.is_empty() {
            return ClassificationReport::default();
        }
        info!("分类 {} 个子域名", hostnames.len());

        // HTTPS、HTTP两次请求加上DNS查询
        let budget = ctx.timeouts.http * 2 + ctx.timeouts.unit;
        let pool = ctx.pool.with_unit_timeout(budget);
        let progress = ctx.progress_for("classify", hostnames.len());
        let classifier = self.clone();
        let unit_ctx = ctx.clone();
        let outcomes = pool
            .run(
                hostnames.to_vec(),
                move |hostname: String| {
                    let classifier = classifier.clone();
                    let ctx = unit_ctx.clone();
                    async move { classifier.classify_host(&ctx, &hostname).await }
                },
                Some(progress),
            )
            .await;

        let mut unfinished = 0;
        let results: Vec<ClassificationResult> = hostnames
            .iter()
            .zip(outcomes)
            .map(|(hostname, outcome)| match outcome {
                UnitOutcome::Done(result) => result,
                UnitOutcome::TimedOut | UnitOutcome::Failed(_) => {
                    unfinished += 1;
                    ClassificationResult {
                        hostname: hostname.clone(),
                        role: Role::Technical,
                        stage: ClassificationStage::Default,
                        evidence: Evidence::default(),
                    }
                }
            })
            .collect();
        if unfinished > 0 {
            warn!("{} 个子域名分类超时，按技术主机处理", unfinished);
        }

        let report = ClassificationReport { results };
        info!(
            "分类完成: {} 个用户站点, {} 个技术主机",
            report.user().len(),
            report.technical().len()
        );
        report
    }
}
