use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{warn, LevelFilter};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use crate::error::{ReconError, Result};

fn log_config() -> Config {
    ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("trust_dns_proto")
        .add_filter_ignore_str("trust_dns_resolver")
        .build()
}

/// 日志文件路径：`<dir>/subrecon_<时间戳>.log`
pub fn log_file_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("subrecon_{}.log", stamp))
}

/// 初始化终端和文件日志。日志文件无法创建时只输出到终端
pub fn init_logger(verbose: bool, log_dir: &Path) -> Result<Option<PathBuf>> {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    let path = log_file_path(log_dir);
    let file = fs::create_dir_all(log_dir).and_then(|_| File::create(&path));
    let (file_path, file_error) = match file {
        Ok(file) => {
            loggers.push(WriteLogger::new(LevelFilter::Debug, log_config(), file));
            (Some(path.clone()), None)
        }
        Err(e) => (None, Some(e)),
    };

    CombinedLogger::init(loggers)
        .map_err(|e| ReconError::Configuration(format!("日志初始化失败: {}", e)))?;

    if let Some(e) = file_error {
        warn!("无法创建日志文件 {}: {}，仅输出到终端", path.display(), e);
    }
    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_lives_in_dir() {
        let path = log_file_path(Path::new("logs"));
        assert!(path.starts_with("logs"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("subrecon_") && name.ends_with(".log"));
    }
}
