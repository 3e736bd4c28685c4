use std::path::PathBuf;

use subrecon::input::DEFAULT_WORDLIST;
use subrecon::{scan_domain, ReconEngine, ReverifyMode, ScanConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("subrecon 库使用快速入门");

    // 方法1: 使用便捷函数（最简单）
    println!("\n=== 方法1: 便捷函数 ===");
    match scan_domain("example.com", Some(PathBuf::from(DEFAULT_WORDLIST))).await {
        Ok(names) => {
            println!("发现 {} 个子域名", names.len());
            for name in names.iter().take(3) {
                println!("  {}", name);
            }
        }
        Err(e) => println!("扫描失败: {}", e),
    }

    // 方法2: 使用配置引擎（推荐）
    println!("\n=== 方法2: 配置引擎 ===");
    let config = ScanConfig {
        domain: "example.com".to_string(),
        wordlist: Some(PathBuf::from(DEFAULT_WORDLIST)),
        zone_transfer: false, // 跳过区域传送
        reverify: ReverifyMode::Annotate,
        classify: true,
        ..Default::default()
    };

    match ReconEngine::new(config) {
        Ok(engine) => {
            let report = engine.run().await;
            println!("发现 {} 个子域名", report.discovery.names.len());
            for method in &report.discovery.methods {
                match &method.error {
                    Some(e) => println!("  {:?}: 失败 ({})", method.source, e),
                    None => println!("  {:?}: {} 个", method.source, method.found),
                }
            }
            if let Some(classification) = &report.classification {
                println!(
                    "用户站点 {} 个，技术主机 {} 个",
                    classification.user().len(),
                    classification.technical().len()
                );
            }
        }
        Err(e) => println!("引擎创建失败: {}", e),
    }

    Ok(())
}
