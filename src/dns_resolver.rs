use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use trust_dns_resolver::config::*;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{ReconError, Result};

/// 默认的公共DNS服务器
pub const PUBLIC_RESOLVERS: &[&str] = &[
    "8.8.8.8",
    "8.8.4.4",
    "1.1.1.1",
    "1.0.0.1",
    "9.9.9.9",
    "149.112.112.112",
    "208.67.222.222",
    "208.67.220.220",
    "77.88.8.8",
    "223.5.5.5",
    "223.6.6.6",
    "119.29.29.29",
];

/// 每次查询使用的服务器子集大小
pub const SUBSET_SIZE: usize = 3;

/// 支持的查询类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    A,
    Cname,
    Mx,
    Ns,
    Txt,
}

impl QueryType {
    fn record_type(self) -> RecordType {
        match self {
            QueryType::A => RecordType::A,
            QueryType::Cname => RecordType::CNAME,
            QueryType::Mx => RecordType::MX,
            QueryType::Ns => RecordType::NS,
            QueryType::Txt => RecordType::TXT,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::A => "A",
            QueryType::Cname => "CNAME",
            QueryType::Mx => "MX",
            QueryType::Ns => "NS",
            QueryType::Txt => "TXT",
        };
        f.write_str(name)
    }
}

/// 单次查询的结果。NXDOMAIN 和空应答都是 `NotFound`，属于正常结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(Vec<String>),
    NotFound,
    Timeout,
}

impl LookupOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found(_))
    }

    pub fn records(&self) -> &[String] {
        match self {
            LookupOutcome::Found(records) => records,
            _ => &[],
        }
    }
}

/// DNS查询接口
#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn resolve(&self, name: &str, query_type: QueryType) -> LookupOutcome;
}

/// 有序的DNS服务器池，只在配置阶段修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverPool {
    servers: Vec<IpAddr>,
    subset_size: usize,
}

impl ResolverPool {
    pub fn new(servers: Vec<IpAddr>) -> Result<Self> {
        if servers.is_empty() {
            return Err(ReconError::Configuration("DNS服务器列表为空".to_string()));
        }
        Ok(ResolverPool {
            servers,
            subset_size: SUBSET_SIZE,
        })
    }

    /// 解析用户给出的服务器地址，列表为空时使用公共服务器
    pub fn from_strings(servers: &[String]) -> Result<Self> {
        if servers.is_empty() {
            return Ok(Self::public());
        }
        let mut parsed = Vec::with_capacity(servers.len());
        for server in servers {
            let ip = server.trim().parse::<IpAddr>().map_err(|_| {
                ReconError::Configuration(format!("无效的DNS服务器地址: {}", server))
            })?;
            if !parsed.contains(&ip) {
                parsed.push(ip);
            }
        }
        Self::new(parsed)
    }

    pub fn public() -> Self {
        ResolverPool {
            servers: PUBLIC_RESOLVERS
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect(),
            subset_size: SUBSET_SIZE,
        }
    }

    pub fn with_subset_size(mut self, subset_size: usize) -> Self {
        self.subset_size = subset_size.max(1);
        self
    }

    pub fn servers(&self) -> &[IpAddr] {
        &self.servers
    }

    /// 按顺序把服务器切分为若干子集
    pub fn subsets(&self) -> Vec<Vec<IpAddr>> {
        self.servers
            .chunks(self.subset_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

impl Default for ResolverPool {
    fn default() -> Self {
        Self::public()
    }
}

/// 单个服务器子集上的解析器
pub struct ResolverGroup {
    resolver: TokioAsyncResolver,
}

impl ResolverGroup {
    /// 只向 `servers` 发送查询，每次查询只尝试一次
    pub fn new(servers: &[IpAddr], attempt_timeout: Duration) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(servers, 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.timeout = attempt_timeout;
        opts.attempts = 1;
        ResolverGroup {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl DnsLookup for ResolverGroup {
    async fn resolve(&self, name: &str, query_type: QueryType) -> LookupOutcome {
        match self.resolver.lookup(name, query_type.record_type()).await {
            Ok(response) => {
                let records: Vec<String> = response
                    .iter()
                    .filter_map(|rdata| extract_record(query_type, rdata))
                    .collect();
                if records.is_empty() {
                    LookupOutcome::NotFound
                } else {
                    LookupOutcome::Found(records)
                }
            }
            Err(err) => classify_error(&err),
        }
    }
}

/// 基于服务器子集轮换的DNS解析器
pub struct DnsResolver {
    groups: Vec<Arc<dyn DnsLookup>>,
    cursor: AtomicUsize,
}

impl DnsResolver {
    /// 为每个服务器子集创建一个解析器，单次尝试的超时为 `attempt_timeout`
    pub fn new(pool: &ResolverPool, attempt_timeout: Duration) -> Self {
        let groups = pool
            .subsets()
            .into_iter()
            .map(|ips| Arc::new(ResolverGroup::new(&ips, attempt_timeout)) as Arc<dyn DnsLookup>)
            .collect();
        Self::from_groups(groups)
    }

    /// 使用现成的查询组，轮换顺序与传入顺序一致
    pub fn from_groups(groups: Vec<Arc<dyn DnsLookup>>) -> Self {
        DnsResolver {
            groups,
            cursor: AtomicUsize::new(0),
        }
    }

    fn next_group(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.groups.len()
    }
}

#[async_trait]
impl DnsLookup for DnsResolver {
    async fn resolve(&self, name: &str, query_type: QueryType) -> LookupOutcome {
        if self.groups.is_empty() {
            return LookupOutcome::Timeout;
        }

        let first = self.next_group();
        let outcome = self.groups[first].resolve(name, query_type).await;
        if outcome != LookupOutcome::Timeout {
            return outcome;
        }

        // 超时后换一组服务器重试一次
        let second = (first + 1) % self.groups.len();
        debug!("{} {} 查询超时，切换到服务器组 {} 重试", name, query_type, second);
        self.groups[second].resolve(name, query_type).await
    }
}

fn classify_error(err: &ResolveError) -> LookupOutcome {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => LookupOutcome::NotFound,
        ResolveErrorKind::Timeout => LookupOutcome::Timeout,
        // 其余网络错误按超时处理，由上层决定是否重试
        _ => {
            debug!("DNS查询失败: {}", err);
            LookupOutcome::Timeout
        }
    }
}

fn extract_record(query_type: QueryType, rdata: &RData) -> Option<String> {
    let value = match (query_type, rdata) {
        (QueryType::A, RData::A(ip)) => ip.to_string(),
        (QueryType::Cname, RData::CNAME(cname)) => cname.to_string(),
        (QueryType::Mx, RData::MX(mx)) => mx.exchange().to_string(),
        (QueryType::Ns, RData::NS(ns)) => ns.to_string(),
        (QueryType::Txt, RData::TXT(txt)) => txt
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    Some(value.trim_end_matches('.').to_string())
}

/// 当前尝试没有结果时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMiss {
    TryNext,
    Stop,
}

/// 查询计划中的一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub query_type: QueryType,
    pub on_miss: OnMiss,
}

impl Attempt {
    pub const fn then_next(query_type: QueryType) -> Self {
        Attempt {
            query_type,
            on_miss: OnMiss::TryNext,
        }
    }

    pub const fn last(query_type: QueryType) -> Self {
        Attempt {
            query_type,
            on_miss: OnMiss::Stop,
        }
    }
}

/// 暴破命中判定：A 或 CNAME
pub const HIT_PLAN: &[Attempt] = &[
    Attempt::then_next(QueryType::A),
    Attempt::last(QueryType::Cname),
];

/// 证书候选确认：A、CNAME 或 MX
pub const CONFIRM_PLAN: &[Attempt] = &[
    Attempt::then_next(QueryType::A),
    Attempt::then_next(QueryType::Cname),
    Attempt::last(QueryType::Mx),
];

/// 查询计划的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Found {
        query_type: QueryType,
        records: Vec<String>,
    },
    NotFound,
    Timeout,
}

impl PlanOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PlanOutcome::Found { .. })
    }
}

/// 按顺序执行查询计划，第一次命中即返回。
/// 全部未命中时，只要有一步超时结果就是 `Timeout`。
pub async fn resolve_plan(dns: &dyn DnsLookup, name: &str, plan: &[Attempt]) -> PlanOutcome {
    let mut timed_out = false;
    for attempt in plan {
        match dns.resolve(name, attempt.query_type).await {
            LookupOutcome::Found(records) => {
                return PlanOutcome::Found {
                    query_type: attempt.query_type,
                    records,
                }
            }
            LookupOutcome::NotFound => {}
            LookupOutcome::Timeout => timed_out = true,
        }
        if attempt.on_miss == OnMiss::Stop {
            break;
        }
    }
    if timed_out {
        PlanOutcome::Timeout
    } else {
        PlanOutcome::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedDns(HashMap<QueryType, LookupOutcome>);

    #[async_trait]
    impl DnsLookup for FixedDns {
        async fn resolve(&self, _name: &str, query_type: QueryType) -> LookupOutcome {
            self.0
                .get(&query_type)
                .cloned()
                .unwrap_or(LookupOutcome::NotFound)
        }
    }

    #[test]
    fn pool_splits_into_subsets_of_three() {
        let servers: Vec<String> = ["1.1.1.1", "8.8.8.8", "9.9.9.9", "8.8.4.4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let pool = ResolverPool::from_strings(&servers).unwrap();
        let subsets = pool.subsets();
        assert_eq!(subsets.len(), 2);
        assert_eq!(subsets[0].len(), 3);
        assert_eq!(subsets[1].len(), 1);
    }

    #[test]
    fn invalid_resolver_is_configuration_error() {
        let err = ResolverPool::from_strings(&["not-an-ip".to_string()]).unwrap_err();
        assert!(matches!(err, ReconError::Configuration(_)));
        assert_eq!(ResolverPool::from_strings(&[]).unwrap(), ResolverPool::public());
    }

    #[tokio::test]
    async fn plan_falls_through_to_cname() {
        let mut answers = HashMap::new();
        answers.insert(
            QueryType::Cname,
            LookupOutcome::Found(vec!["edge.cdn.net".to_string()]),
        );
        let outcome = resolve_plan(&FixedDns(answers), "www.example.com", HIT_PLAN).await;
        assert_eq!(
            outcome,
            PlanOutcome::Found {
                query_type: QueryType::Cname,
                records: vec!["edge.cdn.net".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn plan_reports_timeout_when_nothing_found() {
        let mut answers = HashMap::new();
        answers.insert(QueryType::A, LookupOutcome::Timeout);
        let outcome = resolve_plan(&FixedDns(answers), "x.example.com", HIT_PLAN).await;
        assert_eq!(outcome, PlanOutcome::Timeout);

        let outcome = resolve_plan(&FixedDns(HashMap::new()), "x.example.com", CONFIRM_PLAN).await;
        assert_eq!(outcome, PlanOutcome::NotFound);
    }

    #[tokio::test]
    async fn stop_ends_the_plan_early() {
        let mut answers = HashMap::new();
        answers.insert(QueryType::Mx, LookupOutcome::Found(vec!["mx.example.com".to_string()]));
        let plan = [Attempt::last(QueryType::A), Attempt::last(QueryType::Mx)];
        let outcome = resolve_plan(&FixedDns(answers), "x.example.com", &plan).await;
        assert_eq!(outcome, PlanOutcome::NotFound);
    }

    /// 记录每次调用的查询组，按预设结果应答
    struct RecordingGroup {
        id: usize,
        outcome: LookupOutcome,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl DnsLookup for RecordingGroup {
        async fn resolve(&self, _name: &str, _query_type: QueryType) -> LookupOutcome {
            self.calls.lock().unwrap().push(self.id);
            self.outcome.clone()
        }
    }

    fn resolver(outcomes: Vec<LookupOutcome>) -> (DnsResolver, Arc<Mutex<Vec<usize>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let groups = outcomes
            .into_iter()
            .enumerate()
            .map(|(id, outcome)| {
                Arc::new(RecordingGroup {
                    id,
                    outcome,
                    calls: calls.clone(),
                }) as Arc<dyn DnsLookup>
            })
            .collect();
        (DnsResolver::from_groups(groups), calls)
    }

    #[tokio::test]
    async fn timeout_is_retried_on_the_next_group() {
        let found = LookupOutcome::Found(vec!["192.0.2.1".to_string()]);
        let (dns, calls) = resolver(vec![LookupOutcome::Timeout, found.clone(), found.clone()]);

        assert_eq!(dns.resolve("www.example.com", QueryType::A).await, found);
        assert_eq!(*calls.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn retry_wraps_around_to_the_first_group() {
        let found = LookupOutcome::Found(vec!["192.0.2.1".to_string()]);
        let (dns, calls) = resolver(vec![found.clone(), LookupOutcome::Timeout]);

        dns.resolve("a.example.com", QueryType::A).await;
        assert_eq!(dns.resolve("b.example.com", QueryType::A).await, found);
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let (dns, calls) = resolver(vec![LookupOutcome::NotFound, LookupOutcome::NotFound]);

        assert_eq!(dns.resolve("nope.example.com", QueryType::A).await, LookupOutcome::NotFound);
        assert_eq!(*calls.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn only_one_retry_after_timeout() {
        let (dns, calls) = resolver(vec![LookupOutcome::Timeout; 3]);

        assert_eq!(dns.resolve("slow.example.com", QueryType::A).await, LookupOutcome::Timeout);
        assert_eq!(*calls.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn successive_queries_rotate_groups() {
        let (dns, calls) = resolver(vec![LookupOutcome::NotFound; 3]);

        for name in ["a", "b", "c", "d"] {
            dns.resolve(&format!("{}.example.com", name), QueryType::A).await;
        }
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn no_groups_means_timeout() {
        let dns = DnsResolver::from_groups(Vec::new());
        assert_eq!(dns.resolve("www.example.com", QueryType::A).await, LookupOutcome::Timeout);
    }
}
