use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use crate::error::{ReconError, Result};
use crate::model::WordlistEntry;

/// 从文件加载字典。文件缺失或无法读取属于配置错误。
pub fn load_wordlist(path: &Path) -> Result<Vec<WordlistEntry>> {
    let file = File::open(path).map_err(|e| {
        ReconError::Configuration(format!("无法打开字典文件 {}: {}", path.display(), e))
    })?;
    parse_wordlist(io::BufReader::new(file))
}

/// 逐行解析字典：忽略空行和 `#` 注释，去重并保留首次出现的顺序
pub fn parse_wordlist<R: BufRead>(reader: R) -> Result<Vec<WordlistEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let word = line.trim();
        if word.is_empty() || word.starts_with('#') {
            continue;
        }
        let entry = WordlistEntry::new(word);
        if !entry.label().is_empty() && seen.insert(entry.label().to_string()) {
            entries.push(entry);
        }
    }

    Ok(entries)
}
