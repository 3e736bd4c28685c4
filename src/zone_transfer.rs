//! DNS区域传送探测
//!
//! 先取目标域名的NS记录，再依次向每台权威服务器请求AXFR，
//! 第一次成功即停止。大多数服务商禁用了区域传送，失败是常态。

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use trust_dns_resolver::proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_resolver::proto::rr::{Name, RecordType};

use crate::dns_resolver::{LookupOutcome, QueryType};
use crate::error::{ReconError, Result};
use crate::model::{in_scope, normalize_hostname, DiscoverySource};
use crate::orchestrator::DiscoveryMethod;
use crate::state::RunContext;

/// NS记录查询的最大尝试次数
pub const NS_ATTEMPTS: usize = 3;

/// 区域传送的传输层
#[async_trait]
pub trait ZoneTransport: Send + Sync {
    /// 向 `server` 请求 `zone` 的完整区域数据，返回所有记录的属主名
    async fn transfer(&self, server: IpAddr, zone: &str) -> Result<Vec<String>>;
}

/// DNS over TCP 的默认端口
pub const DNS_PORT: u16 = 53;

/// 基于TCP的AXFR实现
#[derive(Debug, Clone)]
pub struct TcpZoneTransport {
    timeout: Duration,
    port: u16,
}

impl TcpZoneTransport {
    pub fn new(timeout: Duration) -> Self {
        TcpZoneTransport {
            timeout,
            port: DNS_PORT,
        }
    }

    /// 连接权威服务器的非标准端口
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

fn build_axfr_query(zone: &str) -> Result<Vec<u8>> {
    let name = Name::from_ascii(zone).map_err(|e| ReconError::data("axfr", e))?;
    let mut message = Message::new();
    message
        .set_id(rand::random::<u16>())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false);
    message.add_query(Query::query(name, RecordType::AXFR));
    message.to_vec().map_err(|e| ReconError::data("axfr", e))
}

#[async_trait]
impl ZoneTransport for TcpZoneTransport {
    async fn transfer(&self, server: IpAddr, zone: &str) -> Result<Vec<String>> {
        let payload = build_axfr_query(zone)?;

        let exchange = async {
            let mut stream = TcpStream::connect((server, self.port)).await?;
            stream.write_u16(payload.len() as u16).await?;
            stream.write_all(&payload).await?;

            let mut names = Vec::new();
            let mut soa_seen = 0;
            // 区域数据以SOA开始、以SOA结束
            while soa_seen < 2 {
                let length = stream.read_u16().await? as usize;
                let mut buffer = vec![0u8; length];
                stream.read_exact(&mut buffer).await?;

                let response = Message::from_vec(&buffer).map_err(|e| ReconError::data("axfr", e))?;
                if response.response_code() != ResponseCode::NoError {
                    return Err(ReconError::Network(format!(
                        "{} 拒绝区域传送: {}",
                        server,
                        response.response_code()
                    )));
                }
                if response.answers().is_empty() {
                    return Err(ReconError::Network(format!("{} 返回空的区域数据", server)));
                }
                for record in response.answers() {
                    if record.record_type() == RecordType::SOA {
                        soa_seen += 1;
                    }
                    names.push(record.name().to_string());
                }
            }
            Ok::<Vec<String>, ReconError>(names)
        };

        match timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ReconError::Network(format!("{} 区域传送超时", server))),
        }
    }
}

/// 区域传送探测器
#[derive(Clone)]
pub struct ZoneTransferProber {
    transport: Arc<dyn ZoneTransport>,
}

impl ZoneTransferProber {
    pub fn new(transport: Arc<dyn ZoneTransport>) -> Self {
        ZoneTransferProber { transport }
    }

    /// 查询NS记录，超时时换一组服务器重试。名称不存在对本方法是致命的。
    async fn nameservers(&self, ctx: &RunContext) -> Result<Vec<String>> {
        for attempt in 1..=NS_ATTEMPTS {
            match ctx.lookup(&ctx.domain, QueryType::Ns).await {
                LookupOutcome::Found(servers) => return Ok(servers),
                LookupOutcome::NotFound => return Err(ReconError::NameNotFound(ctx.domain.clone())),
                LookupOutcome::Timeout => {
                    warn!("获取 {} 的NS记录超时 (第{}次)", ctx.domain, attempt);
                }
            }
        }
        Err(ReconError::Network(format!("无法获取 {} 的NS记录", ctx.domain)))
    }

    async fn addresses(&self, ctx: &RunContext, nameserver: &str) -> Vec<IpAddr> {
        if let Ok(ip) = nameserver.parse::<IpAddr>() {
            return vec![ip];
        }
        ctx.lookup(nameserver, QueryType::A)
            .await
            .records()
            .iter()
            .filter_map(|record| record.parse().ok())
            .collect()
    }

    /// 尝试区域传送，返回目标域名下的所有名称
    pub async fn probe(&self, ctx: &RunContext) -> Result<Vec<String>> {
        info!("尝试对 {} 进行区域传送", ctx.domain);
        let nameservers = self.nameservers(ctx).await?;

        for nameserver in &nameservers {
            for address in self.addresses(ctx, nameserver).await {
                info!("尝试从 {} ({}) 传送区域", nameserver, address);
                match self.transport.transfer(address, &ctx.domain).await {
                    Ok(names) => {
                        info!("从 {} 区域传送成功", nameserver);
                        let mut found: Vec<String> = names
                            .iter()
                            .map(|name| normalize_hostname(name))
                            .filter(|name| in_scope(&ctx.domain, name))
                            .collect();
                        found.sort();
                        found.dedup();
                        return Ok(found);
                    }
                    Err(e) => debug!("从 {} 区域传送失败: {}", nameserver, e),
                }
            }
        }

        info!("所有权威服务器均未允许区域传送");
        Ok(Vec::new())
    }
}

#[async_trait]
impl DiscoveryMethod for ZoneTransferProber {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::ZoneTransfer
    }

    async fn discover(&self, ctx: &RunContext) -> Result<Vec<String>> {
        self.probe(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_resolver::DnsLookup;
    use crate::state::Timeouts;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use tokio::net::TcpListener;
    use trust_dns_resolver::proto::rr::rdata::SOA;
    use trust_dns_resolver::proto::rr::{RData, Record};

    struct NsDns {
        ns: LookupOutcome,
    }

    #[async_trait]
    impl DnsLookup for NsDns {
        async fn resolve(&self, name: &str, query_type: QueryType) -> LookupOutcome {
            match query_type {
                QueryType::Ns => self.ns.clone(),
                QueryType::A if name == "ns1.example.com" => {
                    LookupOutcome::Found(vec!["192.0.2.1".to_string()])
                }
                QueryType::A if name == "ns2.example.com" => {
                    LookupOutcome::Found(vec!["192.0.2.2".to_string()])
                }
                _ => LookupOutcome::NotFound,
            }
        }
    }

    struct ScriptedTransport {
        allow: Option<IpAddr>,
        calls: Mutex<Vec<IpAddr>>,
    }

    #[async_trait]
    impl ZoneTransport for ScriptedTransport {
        async fn transfer(&self, server: IpAddr, zone: &str) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push(server);
            if Some(server) == self.allow {
                Ok(vec![
                    format!("{}.", zone),
                    format!("WWW.{}.", zone),
                    format!("mail.{}.", zone),
                    format!("mail.{}.", zone),
                    "outside.org.".to_string(),
                ])
            } else {
                Err(ReconError::Network("refused".to_string()))
            }
        }
    }

    fn context(ns: LookupOutcome) -> RunContext {
        RunContext::new("example.com", Arc::new(NsDns { ns }), 4, Timeouts::default())
    }

    fn two_nameservers() -> LookupOutcome {
        LookupOutcome::Found(vec!["ns1.example.com".to_string(), "ns2.example.com".to_string()])
    }

    #[tokio::test]
    async fn stops_at_first_successful_transfer() {
        let transport = Arc::new(ScriptedTransport {
            allow: Some("192.0.2.1".parse().unwrap()),
            calls: Mutex::new(Vec::new()),
        });
        let prober = ZoneTransferProber::new(transport.clone());
        let names = prober.probe(&context(two_nameservers())).await.unwrap();

        assert_eq!(names, vec!["mail.example.com", "www.example.com"]);
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refusal_everywhere_is_not_an_error() {
        let transport = Arc::new(ScriptedTransport {
            allow: None,
            calls: Mutex::new(Vec::new()),
        });
        let prober = ZoneTransferProber::new(transport.clone());
        let names = prober.probe(&context(two_nameservers())).await.unwrap();

        assert!(names.is_empty());
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_domain_fails_the_method() {
        let transport = Arc::new(ScriptedTransport {
            allow: None,
            calls: Mutex::new(Vec::new()),
        });
        let prober = ZoneTransferProber::new(transport);
        let err = prober.probe(&context(LookupOutcome::NotFound)).await.unwrap_err();
        assert!(matches!(err, ReconError::NameNotFound(_)));
    }

    #[tokio::test]
    async fn ns_lookup_is_attempted_three_times() {
        let ctx = context(LookupOutcome::Timeout);
        let prober = ZoneTransferProber::new(Arc::new(TcpZoneTransport::new(Duration::from_millis(10))));
        assert!(prober.probe(&ctx).await.is_err());
        assert_eq!(ctx.counters.snapshot().timeouts, NS_ATTEMPTS);
    }

    #[test]
    fn axfr_query_is_encoded() {
        let payload = build_axfr_query("example.com").unwrap();
        let message = Message::from_vec(&payload).unwrap();
        assert_eq!(message.queries().len(), 1);
        assert_eq!(message.queries()[0].query_type(), RecordType::AXFR);
    }

    fn name(value: &str) -> Name {
        Name::from_ascii(value).unwrap()
    }

    fn soa_record() -> Record {
        let soa = SOA::new(
            name("ns1.example.com."),
            name("hostmaster.example.com."),
            2024010101,
            3600,
            600,
            86400,
            300,
        );
        Record::from_rdata(name("example.com."), 300, RData::SOA(soa))
    }

    fn a_record(host: &str) -> Record {
        Record::from_rdata(name(host), 300, RData::A(Ipv4Addr::new(192, 0, 2, 1).into()))
    }

    fn frame(code: ResponseCode, answers: Vec<Record>) -> Vec<u8> {
        let mut message = Message::new();
        message
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(code);
        for record in answers {
            message.add_answer(record);
        }
        message.to_vec().unwrap()
    }

    /// 本地权威服务器：读完一个带长度前缀的请求后依次写出各帧
    async fn serve_frames(frames: Vec<Vec<u8>>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let length = socket.read_u16().await.unwrap() as usize;
            let mut query = vec![0u8; length];
            socket.read_exact(&mut query).await.unwrap();
            assert!(Message::from_vec(&query).is_ok());

            for frame in frames {
                socket.write_u16(frame.len() as u16).await.unwrap();
                socket.write_all(&frame).await.unwrap();
            }
        });
        port
    }

    fn local_transport(port: u16) -> TcpZoneTransport {
        TcpZoneTransport::new(Duration::from_secs(5)).with_port(port)
    }

    #[tokio::test]
    async fn transfer_reads_frames_until_second_soa() {
        let port = serve_frames(vec![
            frame(ResponseCode::NoError, vec![soa_record(), a_record("www.example.com.")]),
            frame(ResponseCode::NoError, vec![a_record("mail.example.com."), soa_record()]),
        ])
        .await;

        let names = local_transport(port)
            .transfer(IpAddr::V4(Ipv4Addr::LOCALHOST), "example.com")
            .await
            .unwrap();
        let names: Vec<String> = names.iter().map(|n| normalize_hostname(n)).collect();
        assert_eq!(
            names,
            vec!["example.com", "www.example.com", "mail.example.com", "example.com"]
        );
    }

    #[tokio::test]
    async fn refused_transfer_is_an_error() {
        let port = serve_frames(vec![frame(ResponseCode::Refused, Vec::new())]).await;

        let err = local_transport(port)
            .transfer(IpAddr::V4(Ipv4Addr::LOCALHOST), "example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::Network(_)));
    }

    #[tokio::test]
    async fn empty_answer_is_an_error() {
        let port = serve_frames(vec![frame(ResponseCode::NoError, Vec::new())]).await;

        let err = local_transport(port)
            .transfer(IpAddr::V4(Ipv4Addr::LOCALHOST), "example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::Network(_)));
    }
}
