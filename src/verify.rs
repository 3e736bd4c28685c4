use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;

use crate::error::{ReconError, Result};

lazy_static! {
    static ref TITLE_RE: Option<Regex> = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok();
}

/// HTTP探测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpResponseInfo {
    /// 实际响应的协议（https 或 http）
    pub scheme: &'static str,
    pub status: u16,
    pub content_type: Option<String>,
    pub server: Option<String>,
    pub title: Option<String>,
}

/// 对主机发起一次HTTP探测，无响应时返回 `None`
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn probe(&self, host: &str) -> Option<HttpResponseInfo>;
}

/// 基于 reqwest 的探测器：先尝试HTTPS，失败后回退到HTTP
#[derive(Debug, Clone)]
pub struct HttpVerifier {
    client: Client,
}

impl HttpVerifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true) // 接受无效证书
            .user_agent("Mozilla/5.0 (Subdomain Scanner)")
            .build()
            .map_err(|e| ReconError::Configuration(format!("无法创建HTTP客户端: {}", e)))?;
        Ok(HttpVerifier { client })
    }

    async fn fetch(&self, scheme: &'static str, host: &str) -> Option<HttpResponseInfo> {
        let url = format!("{}://{}", scheme, host);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("请求 {} 失败: {}", url, e);
                return None;
            }
        };

        let status = response.status().as_u16();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let content_type = header("content-type");
        let server = header("server");

        let is_html = content_type
            .as_deref()
            .map_or(false, |ct| ct.contains("text/html"));
        let title = if is_html {
            response
                .text()
                .await
                .ok()
                .and_then(|body| extract_title(&body))
        } else {
            None
        };

        Some(HttpResponseInfo {
            scheme,
            status,
            content_type,
            server,
            title,
        })
    }
}

#[async_trait]
impl HttpProbe for HttpVerifier {
    async fn probe(&self, host: &str) -> Option<HttpResponseInfo> {
        match self.fetch("https", host).await {
            Some(info) => Some(info),
            None => self.fetch("http", host).await,
        }
    }
}

/// 提取HTML标题
pub fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .as_ref()?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_extracted_case_insensitively() {
        let html = "<html><HEAD><Title lang=\"en\">\n  Welcome \n</Title></HEAD></html>";
        assert_eq!(extract_title(html), Some("Welcome".to_string()));
    }

    #[test]
    fn empty_or_missing_title_is_none() {
        assert_eq!(extract_title("<title>   </title>"), None);
        assert_eq!(extract_title("<html></html>"), None);
    }
}
