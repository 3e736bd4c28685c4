use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};

use subrecon::input::{normalize_domain, prompt_domain, Opts, OutputFormat};
use subrecon::logger;
use subrecon::output::{default_output_path, save_classification, save_json_report, save_names};
use subrecon::pool::ProgressSink;
use subrecon::{ReconEngine, ReverifyMode, ScanConfig, ScanReport};

/// 终端最多展示的子域名数量
const DISPLAY_LIMIT: usize = 20;

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    if let Err(e) = logger::init_logger(opts.verbose, &opts.log_dir) {
        eprintln!("日志初始化失败: {}", e);
    }

    // 没有域名时直接退出，不做任何发现
    let domain = match opts.domain.as_deref() {
        Some(raw) => normalize_domain(raw),
        None => prompt_domain(),
    };
    let domain = match domain {
        Ok(domain) => domain,
        Err(e) => {
            eprintln!("{} {}", "错误:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_scan(opts, domain).await {
        eprintln!("{} {}", "扫描失败:".red().bold(), e);
        std::process::exit(1);
    }
}

fn build_config(opts: &Opts, domain: &str) -> ScanConfig {
    let reverify = if opts.verify_strict {
        ReverifyMode::Narrow
    } else if opts.verify {
        ReverifyMode::Annotate
    } else {
        ReverifyMode::Off
    };

    ScanConfig {
        domain: domain.to_string(),
        resolvers: opts.resolver.clone(),
        wordlist: Some(opts.wordlist.clone()),
        concurrency: opts.threads,
        zone_transfer: !opts.no_zone_transfer,
        cert_logs: !opts.no_cert_logs,
        brute_force: !opts.no_brute_force,
        reverify,
        filter_wildcard_dns: opts.filter_wildcard_dns,
        classify: opts.classify,
        ..Default::default()
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg:>12} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

/// 执行扫描主逻辑
async fn run_scan(opts: Opts, domain: String) -> Result<(), Box<dyn std::error::Error>> {
    println!("目标域名: {}", domain.cyan().bold());

    let bar = progress_bar();
    let sink_bar = bar.clone();
    let sink: ProgressSink = Arc::new(move |stage: &'static str, done: usize, total: usize| {
        sink_bar.set_message(stage);
        sink_bar.set_length(total as u64);
        sink_bar.set_position(done as u64);
    });

    let engine = ReconEngine::new(build_config(&opts, &domain))?.with_progress(sink);
    let report = engine.run().await;
    bar.finish_and_clear();

    print_summary(&report, opts.filter.as_deref());

    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&domain));
    save_report(&report, &opts, &output);

    Ok(())
}

/// 保存结果。输出失败只影响输出本身
fn save_report(report: &ScanReport, opts: &Opts, output: &Path) {
    let saved = match opts.format {
        OutputFormat::Txt => save_names(report.hostnames(), output, opts.include_wildcards).map(|_| ()),
        OutputFormat::Json => {
            let path = json_path(opts, output);
            save_json_report(report, &path, opts.include_wildcards)
        }
    };
    if let Err(e) = saved {
        error!("保存结果失败: {}", e);
    }

    if let Some(classification) = &report.classification {
        match save_classification(classification, output) {
            Ok(paths) => {
                for path in paths {
                    info!("分类结果已保存到 {}", path.display());
                }
            }
            Err(e) => error!("保存分类结果失败: {}", e),
        }
    }
}

fn json_path(opts: &Opts, output: &Path) -> PathBuf {
    if opts.output.is_some() {
        output.to_path_buf()
    } else {
        output.with_extension("json")
    }
}

fn print_summary(report: &ScanReport, filter: Option<&str>) {
    let names = &report.discovery.names;
    let regular = names.regular();
    let wildcards = names.wildcards();

    println!();
    println!("{}", "=== 扫描结果 ===".bold());
    println!("子域名总数: {}", names.len().to_string().green().bold());
    println!("普通子域名: {}", regular.len());
    println!("泛解析条目: {}", wildcards.len());

    let shown: Vec<String> = report
        .hostnames()
        .into_iter()
        .filter(|name| filter.map_or(true, |f| name.contains(f)))
        .collect();
    for name in shown.iter().take(DISPLAY_LIMIT) {
        let verified = names.get(name).map_or(false, |n| n.verified);
        if verified {
            println!("  {} {}", name.green(), "✓".green());
        } else {
            println!("  {}", name);
        }
    }
    if shown.len() > DISPLAY_LIMIT {
        println!("  ... 以及其他 {} 个", shown.len() - DISPLAY_LIMIT);
    }

    println!();
    println!("{}", "=== 发现方法 ===".bold());
    for method in &report.discovery.methods {
        match &method.error {
            Some(e) => println!("  {:<14} {}", method.source.to_string(), format!("失败: {}", e).red()),
            None => println!("  {:<14} {}", method.source.to_string(), method.found.to_string().green()),
        }
    }

    let counters = report.counters;
    println!(
        "DNS查询: {} 次, 命中 {}, 未找到 {}, 超时 {}",
        counters.queries,
        counters.found,
        counters.not_found,
        counters.timeouts.to_string().yellow()
    );

    if let Some(classification) = &report.classification {
        println!();
        println!("{}", "=== 分类结果 ===".bold());
        println!("用户站点: {}", classification.user().len().to_string().green());
        println!("技术主机: {}", classification.technical().len().to_string().blue());
    }
}
