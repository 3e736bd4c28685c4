//! 字典暴破
//!
//! 每个标签拼成 `label.domain` 后提交到任务池解析，A 或 CNAME 解析成功即为命中。
//! 单个探测失败或超时不会中断其余候选。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::dns_resolver::{PlanOutcome, HIT_PLAN};
use crate::error::{ReconError, Result};
use crate::model::{DiscoverySource, WordlistEntry};
use crate::orchestrator::DiscoveryMethod;
use crate::pool::UnitOutcome;
use crate::providers::ProviderRegistry;
use crate::state::RunContext;
use crate::wildcard::WildcardDetector;
use crate::wordlist;

/// 字典来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    File(PathBuf),
    Labels(Vec<WordlistEntry>),
}

/// 字典暴破器
#[derive(Debug, Clone)]
pub struct BruteForcer {
    source: Option<LabelSource>,
    providers: Arc<ProviderRegistry>,
    filter_wildcard_dns: bool,
}

impl BruteForcer {
    pub fn new(source: Option<LabelSource>) -> Self {
        BruteForcer {
            source,
            providers: Arc::new(ProviderRegistry::empty()),
            filter_wildcard_dns: false,
        }
    }

    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        Self::new(Some(LabelSource::Labels(
            labels.iter().map(|l| WordlistEntry::new(l.as_ref())).collect(),
        )))
    }

    pub fn with_providers(mut self, providers: Arc<ProviderRegistry>) -> Self {
        self.providers = providers;
        self
    }

    /// 开启后丢弃解析结果全部落在泛解析地址内的命中，默认关闭
    pub fn with_wildcard_filter(mut self, enabled: bool) -> Self {
        self.filter_wildcard_dns = enabled;
        self
    }

    fn labels(&self) -> Result<Vec<WordlistEntry>> {
        match &self.source {
            Some(LabelSource::File(path)) => wordlist::load_wordlist(path),
            Some(LabelSource::Labels(labels)) => Ok(labels.clone()),
            None => Err(ReconError::Configuration("未提供字典".to_string())),
        }
    }

    /// 生成全部候选主机名（含服务商扩展标签）
    pub fn candidates(&self, domain: &str) -> Result<Vec<String>> {
        let mut labels = self.labels()?;
        let added = self.providers.augment_labels(domain, &mut labels);
        if added > 0 {
            info!("根据服务商特征追加 {} 个标签", added);
        }
        Ok(labels.iter().map(|entry| entry.candidate(domain)).collect())
    }

    /// 执行暴破，返回命中的主机名
    pub async fn brute_force(&self, ctx: &RunContext) -> Result<Vec<String>> {
        let candidates = self.candidates(&ctx.domain)?;
        if candidates.is_empty() {
            return Err(ReconError::Configuration("字典为空".to_string()));
        }
        info!("使用 {} 个候选名称暴破 {}", candidates.len(), ctx.domain);

        let wildcard = if self.filter_wildcard_dns {
            WildcardDetector::default().detect(ctx).await
        } else {
            None
        };

        let progress = ctx.progress_for("brute-force", candidates.len());
        let unit_ctx = ctx.clone();
        let outcomes = ctx
            .pool
            .run(
                candidates,
                move |candidate: String| {
                    let ctx = unit_ctx.clone();
                    let wildcard = wildcard.clone();
                    async move {
                        match ctx.resolve_plan(&candidate, HIT_PLAN).await {
                            PlanOutcome::Found { records, .. } => {
                                let is_noise = wildcard.as_ref().map_or(false, |w| w.covers(&records));
                                if !is_noise {
                                    ctx.collector.push(candidate);
                                }
                            }
                            PlanOutcome::NotFound | PlanOutcome::Timeout => {}
                        }
                    }
                },
                Some(progress),
            )
            .await;

        let unfinished = outcomes
            .iter()
            .filter(|o| !matches!(o, UnitOutcome::Done(_)))
            .count();
        if unfinished > 0 {
            warn!("{} 个候选名称探测超时或失败", unfinished);
        }

        let mut hits = ctx.collector.drain();
        hits.sort();
        hits.dedup();
        info!("暴破发现 {} 个子域名", hits.len());
        Ok(hits)
    }
}

#[async_trait]
impl DiscoveryMethod for BruteForcer {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::BruteForce
    }

    async fn discover(&self, ctx: &RunContext) -> Result<Vec<String>> {
        self.brute_force(ctx).await
    }
}
