use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::brute::{BruteForcer, LabelSource};
use crate::cert::{self, CertificateLogAggregator};
use crate::classify::{ClassificationReport, Classifier, PatternSet};
use crate::dns_resolver::{DnsResolver, ResolverPool};
use crate::error::Result;
use crate::input::normalize_domain;
use crate::orchestrator::{DiscoveryMethod, DiscoveryOrchestrator, DiscoveryReport, ReverifyMode};
use crate::pool::ProgressSink;
use crate::providers::ProviderRegistry;
use crate::state::{CounterSnapshot, RunContext, Timeouts};
use crate::verify::HttpVerifier;
use crate::zone_transfer::{TcpZoneTransport, ZoneTransferProber};

/// 扫描配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 目标域名，会先经过规范化
    pub domain: String,
    /// DNS服务器列表，为空时使用内置公共DNS
    pub resolvers: Vec<String>,
    /// 字典文件路径
    pub wordlist: Option<PathBuf>,
    /// 并发数
    pub concurrency: usize,
    pub timeouts: Timeouts,
    /// 是否尝试区域传送
    pub zone_transfer: bool,
    /// 是否查询证书透明度日志
    pub cert_logs: bool,
    /// 是否字典暴破
    pub brute_force: bool,
    /// 复核模式
    pub reverify: ReverifyMode,
    /// 是否过滤泛解析产生的暴破结果，默认关闭
    pub filter_wildcard_dns: bool,
    /// 是否对结果分类
    pub classify: bool,
    /// 是否启用服务商特征扩展
    pub provider_augmentation: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            domain: String::new(),
            resolvers: Vec::new(),
            wordlist: None,
            concurrency: 10,
            timeouts: Timeouts::default(),
            zone_transfer: true,
            cert_logs: true,
            brute_force: true,
            reverify: ReverifyMode::Off,
            filter_wildcard_dns: false,
            classify: false,
            provider_augmentation: true,
        }
    }
}

/// 一次完整扫描的结果
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub domain: String,
    pub discovery: DiscoveryReport,
    pub classification: Option<ClassificationReport>,
    pub counters: CounterSnapshot,
}

impl ScanReport {
    /// 全部主机名，按字典序排列
    pub fn hostnames(&self) -> Vec<String> {
        self.discovery.names.sorted_names()
    }
}

/// 扫描引擎
pub struct ReconEngine {
    ctx: RunContext,
    orchestrator: DiscoveryOrchestrator,
    classifier: Option<Classifier>,
}

impl ReconEngine {
    /// 按配置创建真实的DNS、区域传送、证书日志、暴破和分类组件
    pub fn new(config: ScanConfig) -> Result<Self> {
        let domain = normalize_domain(&config.domain)?;
        let timeouts = config.timeouts;

        let pool = ResolverPool::from_strings(&config.resolvers)?;
        info!("使用 {} 个DNS服务器", pool.servers().len());
        let dns = Arc::new(DnsResolver::new(&pool, timeouts.attempt));
        let ctx = RunContext::new(&domain, dns, config.concurrency, timeouts);

        let providers = Arc::new(if config.provider_augmentation {
            ProviderRegistry::builtin()
        } else {
            ProviderRegistry::empty()
        });

        let mut methods: Vec<Box<dyn DiscoveryMethod>> = Vec::new();
        if config.zone_transfer {
            let transport = Arc::new(TcpZoneTransport::new(timeouts.transfer));
            methods.push(Box::new(ZoneTransferProber::new(transport)));
        }
        if config.cert_logs {
            let client = cert::build_client(timeouts.source)?;
            let sources = cert::default_sources(client, &domain, &providers);
            methods.push(Box::new(CertificateLogAggregator::new(sources)));
        }
        if config.brute_force {
            let forcer = BruteForcer::new(config.wordlist.map(LabelSource::File))
                .with_providers(Arc::clone(&providers))
                .with_wildcard_filter(config.filter_wildcard_dns);
            methods.push(Box::new(forcer));
        }

        let classifier = if config.classify {
            let http = Arc::new(HttpVerifier::new(timeouts.http)?);
            Some(Classifier::new(PatternSet::builtin()?, http))
        } else {
            None
        };

        let orchestrator = DiscoveryOrchestrator::new(methods).with_reverify(config.reverify);
        Ok(Self::from_parts(ctx, orchestrator, classifier))
    }

    /// 使用外部组装好的组件创建引擎
    pub fn from_parts(
        ctx: RunContext,
        orchestrator: DiscoveryOrchestrator,
        classifier: Option<Classifier>,
    ) -> Self {
        ReconEngine {
            ctx,
            orchestrator,
            classifier,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.ctx = self.ctx.with_progress(sink);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// 执行发现流程，启用分类时对非泛解析结果分类
    pub async fn run(&self) -> ScanReport {
        info!("开始扫描 {}", self.ctx.domain);
        let discovery = self.orchestrator.run(&self.ctx).await;
        info!("共发现 {} 个子域名", discovery.names.len());

        let classification = match &self.classifier {
            Some(classifier) => {
                let hostnames = discovery.names.regular();
                Some(classifier.classify_all(&self.ctx, &hostnames).await)
            }
            None => None,
        };

        ScanReport {
            domain: self.ctx.domain.clone(),
            discovery,
            classification,
            counters: self.ctx.counters.snapshot(),
        }
    }
}

/// 使用默认配置扫描一个域名，返回排序后的子域名
pub async fn scan_domain(domain: &str, wordlist: Option<PathBuf>) -> Result<Vec<String>> {
    let config = ScanConfig {
        domain: domain.to_string(),
        wordlist,
        ..Default::default()
    };
    let engine = ReconEngine::new(config)?;
    Ok(engine.run().await.hostnames())
}
