//! 运行上下文
//!
//! 这个模块提供每次扫描独立的上下文对象，替代全局静态变量。
//! 上下文携带DNS服务器池、超时配置和计数器，在各组件之间显式传递。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::dns_resolver::{self, Attempt, DnsLookup, LookupOutcome, PlanOutcome, QueryType};
use crate::pool::{Progress, ProgressSink, WorkerPool};

/// 各类超时配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// 单次DNS查询尝试
    pub attempt: Duration,
    /// 单个探测任务（含重试）
    pub unit: Duration,
    /// 单次HTTP请求
    pub http: Duration,
    /// 单台服务器的区域传送
    pub transfer: Duration,
    /// 单个证书日志数据源
    pub source: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            attempt: Duration::from_secs(2),
            unit: Duration::from_secs(6),
            http: Duration::from_secs(3),
            transfer: Duration::from_secs(10),
            source: Duration::from_secs(20),
        }
    }
}

/// DNS查询计数器
#[derive(Debug, Default)]
pub struct ScanCounters {
    queries: AtomicUsize,
    found: AtomicUsize,
    not_found: AtomicUsize,
    timeouts: AtomicUsize,
}

/// 计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub queries: usize,
    pub found: usize,
    pub not_found: usize,
    pub timeouts: usize,
}

impl ScanCounters {
    fn record(&self, outcome: &LookupOutcome) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            LookupOutcome::Found(_) => &self.found,
            LookupOutcome::NotFound => &self.not_found,
            LookupOutcome::Timeout => &self.timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// 只追加的结果收集器
#[derive(Debug, Clone, Default)]
pub struct HitCollector {
    hits: Arc<Mutex<Vec<String>>>,
}

impl HitCollector {
    pub fn push(&self, hostname: String) {
        if let Ok(mut hits) = self.hits.lock() {
            hits.push(hostname);
        }
    }

    pub fn len(&self) -> usize {
        self.hits.lock().map(|hits| hits.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取出当前收集到的全部结果
    pub fn drain(&self) -> Vec<String> {
        match self.hits.lock() {
            Ok(mut hits) => std::mem::take(&mut *hits),
            Err(_) => Vec::new(),
        }
    }
}

/// 一次扫描的上下文
#[derive(Clone)]
pub struct RunContext {
    /// 规范化后的目标域名
    pub domain: String,
    pub dns: Arc<dyn DnsLookup>,
    pub pool: WorkerPool,
    pub timeouts: Timeouts,
    pub counters: Arc<ScanCounters>,
    pub collector: HitCollector,
    pub progress: Option<ProgressSink>,
}

impl RunContext {
    pub fn new(domain: &str, dns: Arc<dyn DnsLookup>, concurrency: usize, timeouts: Timeouts) -> Self {
        RunContext {
            domain: domain.to_string(),
            dns,
            pool: WorkerPool::new(concurrency, timeouts.unit),
            timeouts,
            counters: Arc::new(ScanCounters::default()),
            collector: HitCollector::default(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// 为某个阶段创建进度计数
    pub fn progress_for(&self, stage: &'static str, total: usize) -> Progress {
        Progress::new(stage, total, self.progress.clone())
    }

    /// 经过计数的单次查询
    pub async fn lookup(&self, name: &str, query_type: QueryType) -> LookupOutcome {
        let outcome = self.dns.resolve(name, query_type).await;
        self.counters.record(&outcome);
        outcome
    }

    /// 经过计数的查询计划
    pub async fn resolve_plan(&self, name: &str, plan: &[Attempt]) -> PlanOutcome {
        let counted = CountedLookup(self);
        dns_resolver::resolve_plan(&counted, name, plan).await
    }
}

struct CountedLookup<'a>(&'a RunContext);

#[async_trait::async_trait]
impl<'a> DnsLookup for CountedLookup<'a> {
    async fn resolve(&self, name: &str, query_type: QueryType) -> LookupOutcome {
        self.0.lookup(name, query_type).await
    }
}
