use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use crate::error::{ReconError, Result};

/// 默认字典路径
pub const DEFAULT_WORDLIST: &str = "wordlists/subdomains-top1million-5000.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" => Ok(OutputFormat::Txt),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("不支持的输出格式: {}。支持的格式: txt, json", s)),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "subrecon")]
#[command(version = "0.1.0")]
#[command(about = "Find subdomains via zone transfer, certificate logs and brute force", long_about = None)]
pub struct Opts {
    /// target domain, asked interactively when omitted
    pub domain: Option<String>,

    /// wordlist path
    #[arg(short, long, default_value = DEFAULT_WORDLIST)]
    pub wordlist: PathBuf,

    /// concurrent workers
    #[arg(short, long, default_value_t = 10)]
    pub threads: usize,

    /// output file path, defaults to finds/<domain>.txt
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// custom resolver, can be repeated
    #[arg(short, long)]
    pub resolver: Vec<String>,

    /// keep *.domain entries in saved output
    #[arg(long)]
    pub include_wildcards: bool,

    /// split hosts into user and technical
    #[arg(long)]
    pub classify: bool,

    /// only display names containing this substring
    #[arg(long)]
    pub filter: Option<String>,

    /// re-resolve every found name and mark it
    #[arg(long)]
    pub verify: bool,

    /// re-resolve and drop names that no longer resolve
    #[arg(long)]
    pub verify_strict: bool,

    /// skip zone transfer
    #[arg(long)]
    pub no_zone_transfer: bool,

    /// skip certificate transparency logs
    #[arg(long)]
    pub no_cert_logs: bool,

    /// skip dictionary brute force
    #[arg(long)]
    pub no_brute_force: bool,

    /// drop brute force hits that only match the DNS wildcard answer
    #[arg(long)]
    pub filter_wildcard_dns: bool,

    /// output format (txt, json)
    #[arg(long, default_value = "txt")]
    pub format: OutputFormat,

    /// log directory
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

/// 规范化用户输入的域名：去掉协议、路径、开头的 `www.` 和末尾的 `/` 或 `.`
pub fn normalize_domain(raw: &str) -> Result<String> {
    let mut domain = raw.trim();
    if let Some(pos) = domain.find("://") {
        domain = &domain[pos + 3..];
    }
    if let Some(pos) = domain.find('/') {
        domain = &domain[..pos];
    }
    let domain = domain.trim_end_matches(['/', '.']).to_ascii_lowercase();
    let domain = domain.strip_prefix("www.").unwrap_or(&domain).to_string();

    if domain.is_empty() {
        return Err(ReconError::FatalInput(format!("无效的域名: {:?}", raw)));
    }
    Ok(domain)
}

/// 从标准输入读取一个域名
pub fn prompt_domain() -> Result<String> {
    print!("请输入要扫描的域名: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    normalize_domain(&line)
}
