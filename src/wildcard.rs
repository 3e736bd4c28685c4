use std::collections::HashSet;

use log::info;
use rand::Rng;

use crate::dns_resolver::QueryType;
use crate::state::RunContext;

/// 泛解析地址特征
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WildcardSignature {
    addresses: HashSet<String>,
}

impl WildcardSignature {
    pub fn new<I: IntoIterator<Item = String>>(addresses: I) -> Self {
        WildcardSignature {
            addresses: addresses.into_iter().collect(),
        }
    }

    /// 解析结果全部落在泛解析地址内
    pub fn covers(&self, records: &[String]) -> bool {
        !records.is_empty() && records.iter().all(|r| self.addresses.contains(r))
    }
}

/// 泛解析检测器
#[derive(Debug, Clone)]
pub struct WildcardDetector {
    probes: usize,
}

impl Default for WildcardDetector {
    fn default() -> Self {
        WildcardDetector { probes: 3 }
    }
}

impl WildcardDetector {
    pub fn new(probes: usize) -> Self {
        WildcardDetector { probes: probes.max(1) }
    }

    /// 检测目标域名是否存在泛解析，存在时返回泛解析地址
    pub async fn detect(&self, ctx: &RunContext) -> Option<WildcardSignature> {
        let test_domains = self.generate_test_subdomains(&ctx.domain);
        let mut resolved = 0;
        let mut addresses = HashSet::new();

        for test_domain in &test_domains {
            let outcome = ctx.lookup(test_domain, QueryType::A).await;
            if outcome.is_found() {
                resolved += 1;
                addresses.extend(outcome.records().iter().cloned());
            }
        }

        // 多数随机子域名都能解析，认为存在泛解析
        if resolved * 2 > test_domains.len() {
            info!("检测到泛解析域名: {} -> {:?}", ctx.domain, addresses);
            Some(WildcardSignature { addresses })
        } else {
            None
        }
    }

    /// 生成测试用的随机子域名
    fn generate_test_subdomains(&self, domain: &str) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let chars = b"abcdefghijklmnopqrstuvwxyz0123456789";

        (0..self.probes)
            .map(|_| {
                let random_str: String = (0..12)
                    .map(|_| chars[rng.gen_range(0..chars.len())] as char)
                    .collect();
                format!("{}.{}", random_str, domain)
            })
            .collect()
    }
}
