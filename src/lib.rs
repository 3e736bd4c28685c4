//! # subrecon
//!
//! 子域名发现与分类工具库。
//!
//! ## 特性
//!
//! - 🔁 **区域传送**: 对目标的每台权威DNS服务器尝试AXFR，首次成功即停止
//! - 📜 **证书透明度日志**: 汇总 crt.sh、CertSpotter 等数据源，并逐一解析确认
//! - 🚀 **字典暴破**: 有界并发任务池，每个探测独立超时，自动过滤泛解析
//! - 🏷️ **角色分类**: 按名称模式、HTTP响应和DNS记录区分用户站点与技术主机
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use subrecon::scan_domain;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let names = scan_domain("example.com", Some("wordlists/subdomains-top1million-5000.txt".into())).await?;
//!
//!     println!("发现 {} 个子域名", names.len());
//!     for name in names.iter().take(5) {
//!         println!("  {}", name);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## 高级配置
//!
//! ```rust,no_run
//! use subrecon::{ReconEngine, ReverifyMode, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig {
//!         domain: "example.com".to_string(),
//!         concurrency: 50,
//!         reverify: ReverifyMode::Narrow, // 只保留复核成功的名称
//!         classify: true,                 // 区分用户站点和技术主机
//!         ..Default::default()
//!     };
//!
//!     let engine = ReconEngine::new(config)?;
//!     let report = engine.run().await;
//!
//!     // 处理结果...
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api;
pub mod brute;
pub mod cert;
pub mod classify;
pub mod dns_resolver;
pub mod error;
pub mod input;
pub mod logger;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod pool;
pub mod providers;
pub mod state;
pub mod verify;
pub mod wildcard;
pub mod wordlist;
pub mod zone_transfer;

// 重新导出主要的公共API
pub use api::{scan_domain, ReconEngine, ScanConfig, ScanReport};

// 导出其他有用的类型
pub use brute::{BruteForcer, LabelSource};
pub use cert::{CertificateLogAggregator, CertificateSource};
pub use classify::{ClassificationReport, Classifier, PatternSet};
pub use dns_resolver::{DnsLookup, DnsResolver, LookupOutcome, QueryType, ResolverGroup, ResolverPool};
pub use error::{ReconError, Result};
pub use input::{normalize_domain, OutputFormat};
pub use model::{ClassificationResult, DiscoveredName, DiscoverySource, Role};
pub use orchestrator::{DiscoveredSet, DiscoveryMethod, DiscoveryOrchestrator, ReverifyMode};
pub use output::{render_names, save_names};
pub use providers::ProviderRegistry;
pub use state::{RunContext, Timeouts};
pub use verify::{HttpProbe, HttpVerifier};
pub use wildcard::WildcardDetector;
pub use zone_transfer::{ZoneTransferProber, ZoneTransport};
