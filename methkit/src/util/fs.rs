use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// 列出目录下（非递归）满足条件的普通文件，按文件名排序。
pub fn list_files<F>(dir: &Path, mut keep: F) -> Result<Vec<PathBuf>>
where
    F: FnMut(&str) -> bool,
{
    let rd = std::fs::read_dir(dir).map_err(|e| anyhow!("cannot read directory '{}': {}", dir.display(), e))?;
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if keep(name) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// 文件名（UTF-8），失败时返回空串。
pub fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|s| s.to_str()).unwrap_or("")
}
