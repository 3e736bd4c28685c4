mod common;

use std::sync::Arc;

use common::{MockDns, MockHttp};
use subrecon::model::ClassificationStage;
use subrecon::{Classifier, PatternSet, QueryType, Role, RunContext, Timeouts};

fn context(dns: MockDns) -> RunContext {
    RunContext::new("example.com", dns.into_arc(), 4, Timeouts::default())
}

#[tokio::test]
async fn technical_pattern_beats_user_pattern() {
    // www 同时命中用户模式，api 命中技术模式
    let patterns = PatternSet::new(&[r"\.api\."], &[r"^www\."]).unwrap();
    let http = MockHttp::new().with("www.api.example.com", 200, "text/html");
    let classifier = Classifier::new(patterns, Arc::new(http));

    let result = classifier
        .classify_host(&context(MockDns::new()), "www.api.example.com")
        .await;
    assert_eq!(result.role, Role::Technical);
    assert_eq!(result.stage, ClassificationStage::Pattern);
}

#[tokio::test]
async fn every_host_gets_a_role() {
    let dns = MockDns::new()
        .with("inbound.example.com", QueryType::Mx, &["10 mx.example.com"])
        .with("verify.example.com", QueryType::Txt, &["v=spf1 -all"])
        .with("portal.example.com", QueryType::A, &["192.0.2.7"]);
    let http = MockHttp::new()
        .with("home.example.com", 200, "text/html; charset=utf-8")
        .with("pix.example.com", 200, "image/webp")
        .with("gone.example.com", 503, "text/html");
    let classifier = Classifier::new(PatternSet::builtin().unwrap(), Arc::new(http));

    let hosts: Vec<String> = [
        "www.example.com",
        "cdn3.example.com",
        "home.example.com",
        "pix.example.com",
        "gone.example.com",
        "inbound.example.com",
        "verify.example.com",
        "portal.example.com",
        "silent.example.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let report = classifier.classify_all(&context(dns), &hosts).await;
    assert_eq!(report.results.len(), hosts.len());
    assert_eq!(report.user().len() + report.technical().len(), hosts.len());

    let role = |host: &str| report.get(host).map(|r| r.role);
    assert_eq!(role("www.example.com"), Some(Role::User));
    assert_eq!(role("cdn3.example.com"), Some(Role::Technical));
    assert_eq!(role("home.example.com"), Some(Role::User));
    assert_eq!(role("pix.example.com"), Some(Role::Technical));
    assert_eq!(role("inbound.example.com"), Some(Role::Technical));
    assert_eq!(role("verify.example.com"), Some(Role::Technical));
    assert_eq!(role("portal.example.com"), Some(Role::Technical));
    assert_eq!(role("silent.example.com"), Some(Role::Technical));

    // 非 200 的响应不参与判断，落到默认规则
    let gone = report.get("gone.example.com").unwrap();
    assert_eq!(gone.stage, ClassificationStage::Default);
    assert_eq!(gone.evidence.http_status, Some(503));

    assert_eq!(report.user(), vec!["home.example.com", "www.example.com"]);
}
