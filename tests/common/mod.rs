#![allow(dead_code)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use subrecon::cert::CertificateSource;
use subrecon::verify::{HttpProbe, HttpResponseInfo};
use subrecon::zone_transfer::ZoneTransport;
use subrecon::{DnsLookup, LookupOutcome, QueryType, ReconError, Result};

/// 按 (名称, 类型) 查表的DNS，表中没有的名称返回 NotFound
#[derive(Default)]
pub struct MockDns {
    table: HashMap<(String, QueryType), LookupOutcome>,
}

impl MockDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, query_type: QueryType, records: &[&str]) -> Self {
        let records = records.iter().map(|r| r.to_string()).collect();
        self.table
            .insert((name.to_string(), query_type), LookupOutcome::Found(records));
        self
    }

    pub fn with_timeout(mut self, name: &str, query_type: QueryType) -> Self {
        self.table
            .insert((name.to_string(), query_type), LookupOutcome::Timeout);
        self
    }

    pub fn into_arc(self) -> Arc<dyn DnsLookup> {
        Arc::new(self)
    }
}

#[async_trait]
impl DnsLookup for MockDns {
    async fn resolve(&self, name: &str, query_type: QueryType) -> LookupOutcome {
        self.table
            .get(&(name.to_string(), query_type))
            .cloned()
            .unwrap_or(LookupOutcome::NotFound)
    }
}

/// 返回固定名称的证书数据源
pub struct StaticCertSource(pub Vec<&'static str>);

#[async_trait]
impl CertificateSource for StaticCertSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

/// 总是失败的证书数据源
pub struct DownCertSource;

#[async_trait]
impl CertificateSource for DownCertSource {
    fn name(&self) -> &str {
        "down"
    }

    async fn fetch(&self, _domain: &str) -> Result<Vec<String>> {
        Err(ReconError::unavailable("down", "状态码 502"))
    }
}

/// 所有服务器都拒绝区域传送
pub struct RefusingTransport;

#[async_trait]
impl ZoneTransport for RefusingTransport {
    async fn transfer(&self, server: IpAddr, _zone: &str) -> Result<Vec<String>> {
        Err(ReconError::Network(format!("{} 拒绝区域传送", server)))
    }
}

/// 按主机名返回预设的HTTP响应
#[derive(Default)]
pub struct MockHttp {
    responses: HashMap<String, HttpResponseInfo>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, status: u16, content_type: &str) -> Self {
        self.responses.insert(
            host.to_string(),
            HttpResponseInfo {
                scheme: "https",
                status,
                content_type: Some(content_type.to_string()),
                server: Some("nginx".to_string()),
                title: None,
            },
        );
        self
    }
}

#[async_trait]
impl HttpProbe for MockHttp {
    async fn probe(&self, host: &str) -> Option<HttpResponseInfo> {
        self.responses.get(host).cloned()
    }
}
