//! 发现流程编排
//!
//! 依次执行区域传送、证书日志和字典暴破，把结果合并为一个去重集合。
//! 某个方法失败只会被记录，其余方法照常执行。

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{error, info, warn};
use serde::Serialize;

use crate::dns_resolver::CONFIRM_PLAN;
use crate::error::Result;
use crate::model::{in_scope, normalize_hostname, DiscoveredName, DiscoverySource};
use crate::pool::UnitOutcome;
use crate::state::RunContext;

/// 一种子域名发现方法
#[async_trait]
pub trait DiscoveryMethod: Send + Sync {
    fn source(&self) -> DiscoverySource;

    async fn discover(&self, ctx: &RunContext) -> Result<Vec<String>>;
}

/// 按小写主机名去重的结果集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveredSet {
    names: BTreeMap<String, DiscoveredName>,
}

impl DiscoveredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一个名称。不属于 `domain` 的名称被丢弃，返回是否为新名称
    pub fn insert(&mut self, domain: &str, hostname: &str, source: DiscoverySource) -> bool {
        let key = normalize_hostname(hostname);
        if !in_scope(domain, &key) {
            return false;
        }
        match self.names.get_mut(&key) {
            Some(existing) => {
                existing.sources.insert(source);
                false
            }
            None => {
                self.names.insert(key.clone(), DiscoveredName::new(&key, source));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.names.contains_key(&normalize_hostname(hostname))
    }

    pub fn get(&self, hostname: &str) -> Option<&DiscoveredName> {
        self.names.get(&normalize_hostname(hostname))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredName> {
        self.names.values()
    }

    /// 按字典序排列的全部主机名
    pub fn sorted_names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }

    /// 非泛解析条目
    pub fn regular(&self) -> Vec<String> {
        self.iter()
            .filter(|n| !n.is_wildcard())
            .map(|n| n.hostname.clone())
            .collect()
    }

    /// 以 `*` 开头的泛解析条目
    pub fn wildcards(&self) -> Vec<String> {
        self.iter()
            .filter(|n| n.is_wildcard())
            .map(|n| n.hostname.clone())
            .collect()
    }

    fn mark_verified(&mut self, hostname: &str) {
        if let Some(name) = self.names.get_mut(hostname) {
            name.verified = true;
        }
    }

    fn retain_verified(&mut self) {
        self.names.retain(|_, name| name.verified);
    }
}

/// 复核模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverifyMode {
    /// 不复核
    #[default]
    Off,
    /// 复核并标记，保留全部结果
    Annotate,
    /// 只保留复核成功的名称
    Narrow,
}

/// 单个发现方法的执行情况
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodReport {
    pub source: DiscoverySource,
    pub found: usize,
    pub error: Option<String>,
}

/// 一次发现流程的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub names: DiscoveredSet,
    pub methods: Vec<MethodReport>,
}

/// 发现流程编排器
pub struct DiscoveryOrchestrator {
    methods: Vec<Box<dyn DiscoveryMethod>>,
    reverify: ReverifyMode,
}

impl DiscoveryOrchestrator {
    pub fn new(methods: Vec<Box<dyn DiscoveryMethod>>) -> Self {
        DiscoveryOrchestrator {
            methods,
            reverify: ReverifyMode::Off,
        }
    }

    pub fn with_reverify(mut self, mode: ReverifyMode) -> Self {
        self.reverify = mode;
        self
    }

    pub async fn run(&self, ctx: &RunContext) -> DiscoveryReport {
        let mut names = DiscoveredSet::new();
        let mut methods = Vec::with_capacity(self.methods.len());

        for method in &self.methods {
            let source = method.source();
            info!("开始执行发现方法: {}", source);
            match method.discover(ctx).await {
                Ok(found) => {
                    let added = found
                        .iter()
                        .filter(|name| names.insert(&ctx.domain, name, source))
                        .count();
                    info!("{} 返回 {} 个名称，其中 {} 个为新名称", source, found.len(), added);
                    methods.push(MethodReport {
                        source,
                        found: found.len(),
                        error: None,
                    });
                }
                Err(e) => {
                    error!("发现方法 {} 失败: {}", source, e);
                    methods.push(MethodReport {
                        source,
                        found: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if self.reverify != ReverifyMode::Off && !names.is_empty() {
            self.reverify(ctx, &mut names).await;
        }

        DiscoveryReport { names, methods }
    }

    /// 并发重新解析所有名称（A、CNAME、MX 任一命中即可）。单个名称复核失败只影响它自己。
    async fn reverify(&self, ctx: &RunContext, names: &mut DiscoveredSet) {
        let hostnames = names.sorted_names();
        info!("复核 {} 个子域名", hostnames.len());

        let progress = ctx.progress_for("reverify", hostnames.len());
        let unit_ctx = ctx.clone();
        let outcomes = ctx
            .pool
            .gather(
                hostnames.clone(),
                move |hostname: String| {
                    let ctx = unit_ctx.clone();
                    async move { ctx.resolve_plan(&hostname, CONFIRM_PLAN).await.is_found() }
                },
                Some(progress),
            )
            .await;

        let mut failed = 0;
        for (hostname, outcome) in hostnames.iter().zip(outcomes) {
            match outcome {
                UnitOutcome::Done(true) => names.mark_verified(hostname),
                UnitOutcome::Done(false) => {}
                UnitOutcome::TimedOut | UnitOutcome::Failed(_) => failed += 1,
            }
        }
        if failed > 0 {
            warn!("{} 个子域名复核超时或失败", failed);
        }

        if self.reverify == ReverifyMode::Narrow {
            let before = names.len();
            names.retain_verified();
            info!("复核后保留 {}/{} 个子域名", names.len(), before);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_resolver::{DnsLookup, LookupOutcome, QueryType};
    use crate::error::ReconError;
    use crate::state::Timeouts;
    use std::sync::Arc;

    struct Fixed(DiscoverySource, Vec<&'static str>);

    #[async_trait]
    impl DiscoveryMethod for Fixed {
        fn source(&self) -> DiscoverySource {
            self.0
        }

        async fn discover(&self, _ctx: &RunContext) -> Result<Vec<String>> {
            Ok(self.1.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Failing(DiscoverySource);

    #[async_trait]
    impl DiscoveryMethod for Failing {
        fn source(&self) -> DiscoverySource {
            self.0
        }

        async fn discover(&self, _ctx: &RunContext) -> Result<Vec<String>> {
            Err(ReconError::Network("连接被拒绝".to_string()))
        }
    }

    struct KnownHosts;

    #[async_trait]
    impl DnsLookup for KnownHosts {
        async fn resolve(&self, name: &str, query_type: QueryType) -> LookupOutcome {
            match (name, query_type) {
                ("www.example.com", QueryType::A) => LookupOutcome::Found(vec!["192.0.2.1".to_string()]),
                ("inbound.example.com", QueryType::Mx) => {
                    LookupOutcome::Found(vec!["mx.example.net".to_string()])
                }
                _ => LookupOutcome::NotFound,
            }
        }
    }

    fn ctx() -> RunContext {
        RunContext::new("example.com", Arc::new(KnownHosts), 4, Timeouts::default())
    }

    #[test]
    fn set_merges_case_insensitively() {
        let mut set = DiscoveredSet::new();
        assert!(set.insert("example.com", "WWW.example.com", DiscoverySource::CertificateLog));
        assert!(!set.insert("example.com", "www.example.com.", DiscoverySource::BruteForce));
        assert!(!set.insert("example.com", "example.com", DiscoverySource::BruteForce));
        assert!(!set.insert("example.com", "www.other.org", DiscoverySource::BruteForce));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("www.example.com").unwrap().sources.len(), 2);
    }

    #[test]
    fn wildcards_are_tracked_apart() {
        let mut set = DiscoveredSet::new();
        set.insert("example.com", "*.a.example.com", DiscoverySource::CertificateLog);
        set.insert("example.com", "b.example.com", DiscoverySource::CertificateLog);
        assert_eq!(set.regular(), vec!["b.example.com"]);
        assert_eq!(set.wildcards(), vec!["*.a.example.com"]);
        assert_eq!(set.sorted_names(), vec!["*.a.example.com", "b.example.com"]);
    }

    #[tokio::test]
    async fn failing_method_does_not_stop_the_rest() {
        let orchestrator = DiscoveryOrchestrator::new(vec![
            Box::new(Failing(DiscoverySource::ZoneTransfer)),
            Box::new(Fixed(DiscoverySource::CertificateLog, vec!["b.example.com", "a.example.com"])),
            Box::new(Fixed(DiscoverySource::BruteForce, vec!["A.example.com"])),
        ]);
        let report = orchestrator.run(&ctx()).await;
        assert_eq!(report.names.sorted_names(), vec!["a.example.com", "b.example.com"]);
        assert!(report.methods[0].error.is_some());
        assert_eq!(report.methods[1].found, 2);
    }

    #[tokio::test]
    async fn narrow_keeps_only_reconfirmed_names() {
        let methods: Vec<Box<dyn DiscoveryMethod>> = vec![Box::new(Fixed(
            DiscoverySource::CertificateLog,
            vec!["www.example.com", "old.example.com"],
        ))];
        let report = DiscoveryOrchestrator::new(methods)
            .with_reverify(ReverifyMode::Narrow)
            .run(&ctx())
            .await;
        assert_eq!(report.names.sorted_names(), vec!["www.example.com"]);
        assert!(report.names.get("www.example.com").unwrap().verified);
    }

    #[tokio::test]
    async fn annotate_keeps_everything() {
        let methods: Vec<Box<dyn DiscoveryMethod>> = vec![Box::new(Fixed(
            DiscoverySource::CertificateLog,
            vec!["www.example.com", "old.example.com"],
        ))];
        let report = DiscoveryOrchestrator::new(methods)
            .with_reverify(ReverifyMode::Annotate)
            .run(&ctx())
            .await;
        assert_eq!(report.names.len(), 2);
        assert!(!report.names.get("old.example.com").unwrap().verified);
    }

    #[tokio::test]
    async fn narrow_keeps_mail_only_names() {
        let methods: Vec<Box<dyn DiscoveryMethod>> = vec![Box::new(Fixed(
            DiscoverySource::CertificateLog,
            vec!["inbound.example.com", "old.example.com"],
        ))];
        let report = DiscoveryOrchestrator::new(methods)
            .with_reverify(ReverifyMode::Narrow)
            .run(&ctx())
            .await;
        assert_eq!(report.names.sorted_names(), vec!["inbound.example.com"]);
        assert!(report.names.get("inbound.example.com").unwrap().verified);
    }
}
