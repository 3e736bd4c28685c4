use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::api::ScanReport;
use crate::classify::ClassificationReport;
use crate::error::{ReconError, Result};
use crate::model::{normalize_hostname, ClassificationResult, Role};
use crate::orchestrator::MethodReport;
use crate::state::CounterSnapshot;

/// 结果目录
pub const FINDS_DIR: &str = "finds";

/// 去重（大小写不敏感）并排序，默认剔除以 `*` 开头的泛解析条目
pub fn render_names<I, S>(names: I, include_wildcards: bool) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| normalize_hostname(name.as_ref()))
        .filter(|name| !name.is_empty())
        .filter(|name| include_wildcards || !name.starts_with('*'))
        .sorted()
        .dedup()
        .collect()
}

/// 默认输出路径：`finds/<domain中的.替换为_>.txt`
pub fn default_output_path(domain: &str) -> PathBuf {
    Path::new(FINDS_DIR).join(format!("{}.txt", domain.replace('.', "_")))
}

/// 分类结果文件：`<stem>_user.txt` 或 `<stem>_technical.txt`
pub fn role_output_path(base: &Path, role: Role) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "subdomains".to_string());
    base.with_file_name(format!("{}_{}.txt", stem, role))
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    if path.as_os_str().is_empty() {
        return Err(ReconError::Configuration("未指定输出文件".to_string()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// 每行一个主机名写入文件，返回写入的条数。结果为空时不创建文件
pub fn save_names<I, S>(names: I, path: &Path, include_wildcards: bool) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if path.as_os_str().is_empty() {
        return Err(ReconError::Configuration("未指定输出文件".to_string()));
    }
    let lines = render_names(names, include_wildcards);
    if lines.is_empty() {
        warn!("没有可保存的子域名，跳过 {}", path.display());
        return Ok(0);
    }

    let mut writer = create_file(path)?;
    for line in &lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    info!("已保存 {} 个子域名到 {}", lines.len(), path.display());
    Ok(lines.len())
}

/// 按角色分别保存分类结果，返回实际写入的文件
pub fn save_classification(report: &ClassificationReport, base: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (role, names) in [(Role::User, report.user()), (Role::Technical, report.technical())] {
        let path = role_output_path(base, role);
        if save_names(&names, &path, true)? > 0 {
            written.push(path);
        }
    }
    Ok(written)
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    domain: &'a str,
    generated_at: String,
    subdomains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wildcards: Option<Vec<String>>,
    methods: &'a [MethodReport],
    classification: Option<&'a [ClassificationResult]>,
    counters: CounterSnapshot,
}

/// 以JSON格式保存完整扫描报告
pub fn save_json_report(report: &ScanReport, path: &Path, include_wildcards: bool) -> Result<()> {
    let json = JsonReport {
        domain: &report.domain,
        generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        subdomains: render_names(report.hostnames(), include_wildcards),
        wildcards: include_wildcards.then(|| report.discovery.names.wildcards()),
        methods: &report.discovery.methods,
        classification: report.classification.as_ref().map(|c| c.results.as_slice()),
        counters: report.counters,
    };
    let data = serde_json::to_string_pretty(&json)
        .map_err(|e| ReconError::Configuration(format!("无法序列化报告: {}", e)))?;

    let mut writer = create_file(path)?;
    writer.write_all(data.as_bytes())?;
    writer.flush()?;
    info!("报告已导出到: {}", path.display());
    Ok(())
}
