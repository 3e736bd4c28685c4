//! 证书透明度日志聚合
//!
//! 依次查询多个互相独立的证书日志数据源，任一数据源失败只影响它自己。
//! 汇总后的候选名称必须经过一次 A、CNAME 或 MX 解析确认才会返回。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::dns_resolver::{PlanOutcome, CONFIRM_PLAN};
use crate::error::{ReconError, Result};
use crate::model::{in_scope, normalize_hostname, DiscoverySource};
use crate::orchestrator::DiscoveryMethod;
use crate::providers::ProviderRegistry;
use crate::state::RunContext;

pub const CRTSH_URL: &str = "https://crt.sh";
pub const CERTSPOTTER_URL: &str = "https://api.certspotter.com";

/// 证书日志数据源
#[async_trait]
pub trait CertificateSource: Send + Sync {
    fn name(&self) -> &str;

    /// 返回数据源中与 `domain` 相关的原始主机名
    async fn fetch(&self, domain: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    #[serde(default)]
    name_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CertSpotterIssuance {
    #[serde(default)]
    dns_names: Vec<String>,
}

/// 解析 crt.sh 的JSON响应，`name_value` 中可能包含多个以换行分隔的名称
pub fn parse_crtsh(body: &str) -> Result<Vec<String>> {
    let entries: Vec<CrtShEntry> =
        serde_json::from_str(body).map_err(|e| ReconError::data("crt.sh", e))?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| entry.name_value)
        .flat_map(|value| {
            value
                .split('\n')
                .map(|name| name.to_string())
                .collect::<Vec<_>>()
        })
        .collect())
}

/// 解析 CertSpotter 的JSON响应
pub fn parse_certspotter(body: &str) -> Result<Vec<String>> {
    let issuances: Vec<CertSpotterIssuance> =
        serde_json::from_str(body).map_err(|e| ReconError::data("certspotter", e))?;
    Ok(issuances.into_iter().flat_map(|i| i.dns_names).collect())
}

/// 只保留以 `.domain` 结尾且不等于 `domain` 的名称
pub fn filter_candidates<I, S>(domain: &str, names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| normalize_hostname(name.as_ref()))
        .filter(|name| in_scope(domain, name))
        .collect()
}

async fn get_body(client: &Client, source: &str, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ReconError::unavailable(source, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ReconError::unavailable(source, format!("状态码 {}", status)));
    }
    response
        .text()
        .await
        .map_err(|e| ReconError::data(source, e))
}

/// crt.sh 数据源
#[derive(Debug, Clone)]
pub struct CrtShSource {
    client: Client,
    base_url: String,
}

impl CrtShSource {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, CRTSH_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        CrtShSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, zone: &str) -> String {
        format!("{}/?q=%25.{}&output=json", self.base_url, zone)
    }
}

#[async_trait]
impl CertificateSource for CrtShSource {
    fn name(&self) -> &str {
        "crt.sh"
    }

    async fn fetch(&self, domain: &str) -> Result<Vec<String>> {
        let body = get_body(&self.client, self.name(), &self.url(domain)).await?;
        parse_crtsh(&body)
    }
}

/// CertSpotter 数据源
#[derive(Debug, Clone)]
pub struct CertSpotterSource {
    client: Client,
    base_url: String,
}

impl CertSpotterSource {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, CERTSPOTTER_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        CertSpotterSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CertificateSource for CertSpotterSource {
    fn name(&self) -> &str {
        "certspotter"
    }

    async fn fetch(&self, domain: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/v1/issuances?domain={}&include_subdomains=true&expand=dns_names",
            self.base_url, domain
        );
        let body = get_body(&self.client, self.name(), &url).await?;
        parse_certspotter(&body)
    }
}

/// 针对大型服务商的子区域查询。对整个域名的通配查询经常超时，
/// 因此改为逐个子区域查询 crt.sh。
#[derive(Debug, Clone)]
pub struct ProviderZoneSource {
    crtsh: CrtShSource,
    zones: Vec<String>,
}

impl ProviderZoneSource {
    pub fn new(crtsh: CrtShSource, zones: Vec<String>) -> Self {
        ProviderZoneSource { crtsh, zones }
    }
}

#[async_trait]
impl CertificateSource for ProviderZoneSource {
    fn name(&self) -> &str {
        "crt.sh-provider-zones"
    }

    async fn fetch(&self, _domain: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut failures = 0;
        for zone in &self.zones {
            match self.crtsh.fetch(zone).await {
                Ok(found) => names.extend(found),
                Err(e) => {
                    warn!("查询子区域 {} 失败: {}", zone, e);
                    failures += 1;
                }
            }
        }
        if failures > 0 && failures == self.zones.len() {
            return Err(ReconError::unavailable(self.name(), "所有子区域查询均失败"));
        }
        Ok(names)
    }
}

/// 创建证书日志查询使用的HTTP客户端
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (Subdomain Scanner)")
        .build()
        .map_err(|e| ReconError::Configuration(format!("无法创建HTTP客户端: {}", e)))
}

/// 默认数据源：crt.sh、CertSpotter，以及匹配服务商时的子区域查询
pub fn default_sources(
    client: Client,
    domain: &str,
    providers: &ProviderRegistry,
) -> Vec<Arc<dyn CertificateSource>> {
    let crtsh = CrtShSource::new(client.clone());
    let mut sources: Vec<Arc<dyn CertificateSource>> = vec![
        Arc::new(crtsh.clone()),
        Arc::new(CertSpotterSource::new(client)),
    ];
    let zones = providers.ct_zones(domain);
    if !zones.is_empty() {
        info!("启用服务商子区域查询: {:?}", zones);
        sources.push(Arc::new(ProviderZoneSource::new(crtsh, zones)));
    }
    sources
}

/// 证书日志聚合器
#[derive(Clone)]
pub struct CertificateLogAggregator {
    sources: Vec<Arc<dyn CertificateSource>>,
}

impl CertificateLogAggregator {
    pub fn new(sources: Vec<Arc<dyn CertificateSource>>) -> Self {
        CertificateLogAggregator { sources }
    }

    /// 查询全部数据源并合并结果，单个数据源失败只记录日志
    pub async fn aggregate(&self, domain: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for source in &self.sources {
            match source.fetch(domain).await {
                Ok(names) => {
                    let names = filter_candidates(domain, names);
                    info!("{} 返回 {} 个候选子域名", source.name(), names.len());
                    found.extend(names);
                }
                Err(e) => warn!("{} 查询失败: {}", source.name(), e),
            }
        }
        found
    }

    /// 汇总候选并逐一解析确认
    pub async fn search(&self, ctx: &RunContext) -> Result<Vec<String>> {
        info!("通过证书透明度日志查找 {} 的子域名", ctx.domain);
        let candidates: Vec<String> = self.aggregate(&ctx.domain).await.into_iter().collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let progress = ctx.progress_for("ct-verify", candidates.len());
        let unit_ctx = ctx.clone();
        let outcomes = ctx
            .pool
            .run(
                candidates,
                move |candidate: String| {
                    let ctx = unit_ctx.clone();
                    async move {
                        let outcome = ctx.resolve_plan(&candidate, CONFIRM_PLAN).await;
                        (candidate, outcome)
                    }
                },
                Some(progress),
            )
            .await;

        let confirmed: Vec<String> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.done())
            .filter(|(_, outcome)| matches!(outcome, PlanOutcome::Found { .. }))
            .map(|(candidate, _)| candidate)
            .collect();
        info!("证书日志中 {} 个子域名解析确认", confirmed.len());
        Ok(confirmed)
    }
}

#[async_trait]
impl DiscoveryMethod for CertificateLogAggregator {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::CertificateLog
    }

    async fn discover(&self, ctx: &RunContext) -> Result<Vec<String>> {
        self.search(ctx).await
    }
}
