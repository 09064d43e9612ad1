//! 根据 FASTQ 首条 header 判定建库时使用的 index，并与实验记录表核对。

use anyhow::{anyhow, bail, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::adapter;
use crate::io::{fastq, xopen};
use crate::sample;
use crate::util::fs;

/// 未识别时使用的占位值
pub const UNKNOWN: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub sample_id: String,
    pub index: String,
    pub full_id: String,
    pub path: String,
}

impl IndexRecord {
    fn unknown(path: &Path) -> Self {
        Self {
            sample_id: UNKNOWN.to_string(),
            index: UNKNOWN.to_string(),
            full_id: UNKNOWN.to_string(),
            path: path.display().to_string(),
        }
    }

    pub fn to_tsv_line(&self) -> String {
        format!("{}\t{}\t{}\t{}", self.sample_id, self.index, self.full_id, self.path)
    }
}

pub const RECORD_COLUMNS: [&str; 4] = ["SampleID", "Index", "FullID", "Path"];

/// 单个文件：文件名给出 SampleID / 方向，首行 header 给出 index。
/// 读取或解析失败时除 `path` 外全部为 `"0"`。
pub fn identify_file(path: &Path) -> IndexRecord {
    match try_identify(path) {
        Ok(rec) => rec,
        Err(e) => {
            log::debug!("{}: {}", path.display(), e);
            IndexRecord::unknown(path)
        }
    }
}

fn try_identify(path: &Path) -> Result<IndexRecord> {
    let (sample_id, full_id) = match sample::parse_sequencer_name(fs::file_name(path)) {
        Some(s) if s.sample_id != UNKNOWN => {
            let full = s.full_id();
            (s.sample_id, full)
        }
        Some(s) => (s.sample_id, UNKNOWN.to_string()),
        None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    };

    let header = fastq::first_header(path)?.ok_or_else(|| anyhow!("empty file"))?;
    let (key1, key2) =
        adapter::barcodes_from_header(&header).ok_or_else(|| anyhow!("header has no KEY1+KEY2 field"))?;
    let index = adapter::resolve(key1, key2).unwrap_or(UNKNOWN).to_string();

    Ok(IndexRecord { sample_id, index, full_id, path: path.display().to_string() })
}

/// `path` 为文件时只处理该文件；为目录时处理所有 `*.{suffix}` 文件并按 FullID 排序。
pub fn identify_path(path: &Path, suffix: &str) -> Result<Vec<IndexRecord>> {
    if path.is_file() {
        return Ok(vec![identify_file(path)]);
    }
    if !path.is_dir() {
        bail!("no such file or directory: '{}'", path.display());
    }
    let ext = format!(".{}", suffix);
    let files: Vec<PathBuf> = fs::list_files(path, |name| name.ends_with(&ext))?;
    log::info!("examining {} file(s) in {}", files.len(), path.display());

    let mut records: Vec<IndexRecord> = files.par_iter().map(|f| identify_file(f)).collect();
    records.sort_by(|a, b| a.full_id.cmp(&b.full_id));
    Ok(records)
}

pub fn write_records<W: Write>(records: &[IndexRecord], mut w: W) -> Result<()> {
    writeln!(w, "{}", RECORD_COLUMNS.join("\t"))?;
    for r in records {
        writeln!(w, "{}", r.to_tsv_line())?;
    }
    w.flush()?;
    Ok(())
}

/// 观测值与实验表按 SampleID 内连接后的一行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparedRow {
    pub observed: IndexRecord,
    /// 实验表中的 Index（表中无该列时为 `None`）
    pub expected: Option<String>,
    /// 实验表中其余列的值，与 [`JoinedTable::extra_columns`] 对齐
    pub extra: Vec<String>,
}

impl ComparedRow {
    pub fn is_match(&self) -> bool {
        self.expected.as_deref() == Some(self.observed.index.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct JoinedTable {
    pub has_expected: bool,
    pub extra_columns: Vec<String>,
    pub rows: Vec<ComparedRow>,
}

impl JoinedTable {
    pub fn write_tsv<W: Write>(&self, mut w: W) -> Result<()> {
        // 只有两侧都有 Index 列时才加后缀
        let observed = if self.has_expected { "Index_x" } else { "Index" };
        let mut header: Vec<&str> = vec!["SampleID", observed, "FullID", "Path"];
        if self.has_expected {
            header.push("Index_y");
        }
        header.extend(self.extra_columns.iter().map(String::as_str));
        writeln!(w, "{}", header.join("\t"))?;
        for row in &self.rows {
            write!(w, "{}", row.observed.to_tsv_line())?;
            if let Some(e) = &row.expected {
                write!(w, "\t{}", e)?;
            }
            for v in &row.extra {
                write!(w, "\t{}", v)?;
            }
            writeln!(w)?;
        }
        w.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Comparison {
    /// 全部一致，返回完整连接表
    Matched(JoinedTable),
    /// 仅返回不一致的行
    Mismatched(JoinedTable),
    /// 实验表缺少 Index 列，返回未比较的连接表
    MissingIndexColumn(JoinedTable),
}

impl Comparison {
    pub fn is_success(&self) -> bool {
        matches!(self, Comparison::Matched(_))
    }

    pub fn table(&self) -> &JoinedTable {
        match self {
            Comparison::Matched(t) | Comparison::Mismatched(t) | Comparison::MissingIndexColumn(t) => t,
        }
    }
}

/// 实验记录表中每个 SampleID 对应的行（全部按字符串读取）。
struct ExpectedTable {
    index_col: Option<usize>,
    extra_cols: Vec<(usize, String)>,
    by_sample: HashMap<String, Vec<csv::StringRecord>>,
}

fn read_expected(path: &Path) -> Result<ExpectedTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| anyhow!("cannot open CSV '{}': {}", path.display(), e))?;
    let headers = rdr.headers()?.clone();
    let sample_col = headers
        .iter()
        .position(|h| h == "SampleID")
        .ok_or_else(|| anyhow!("CSV '{}' has no 'SampleID' column", path.display()))?;
    let index_col = headers.iter().position(|h| h == "Index");
    let extra_cols = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != sample_col && Some(*i) != index_col)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut by_sample: HashMap<String, Vec<csv::StringRecord>> = HashMap::new();
    for rec in rdr.records() {
        let rec = rec?;
        let id = rec.get(sample_col).unwrap_or("").to_string();
        by_sample.entry(id).or_default().push(rec);
    }
    Ok(ExpectedTable { index_col, extra_cols, by_sample })
}

/// 比较目录内 FASTQ 的实际 index 与实验表中的预期 index。
pub fn compare_indexes(dir: &Path, expected_csv: &Path) -> Result<Comparison> {
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }
    if !expected_csv.is_file() {
        bail!("CSV file not found: {}", expected_csv.display());
    }

    let observed = identify_path(dir, "gz")?;
    let expected = read_expected(expected_csv)?;

    let mut table = JoinedTable {
        has_expected: expected.index_col.is_some(),
        extra_columns: expected.extra_cols.iter().map(|(_, h)| h.clone()).collect(),
        rows: Vec::new(),
    };
    for obs in &observed {
        let Some(rows) = expected.by_sample.get(&obs.sample_id) else {
            continue;
        };
        for rec in rows {
            table.rows.push(ComparedRow {
                observed: obs.clone(),
                expected: expected.index_col.map(|i| rec.get(i).unwrap_or("").to_string()),
                extra: expected
                    .extra_cols
                    .iter()
                    .map(|(i, _)| rec.get(*i).unwrap_or("").to_string())
                    .collect(),
            });
        }
    }

    if !table.has_expected {
        log::warn!("'Index' column not found in {}", expected_csv.display());
        return Ok(Comparison::MissingIndexColumn(table));
    }
    if table.rows.iter().all(ComparedRow::is_match) {
        return Ok(Comparison::Matched(table));
    }
    table.rows.retain(|r| !r.is_match());
    log::warn!("{} row(s) with mismatched indexes", table.rows.len());
    Ok(Comparison::Mismatched(table))
}

/// 目录内每个 `.gz` 文件的首行；无法按 gzip 读取时为 `None`。
pub fn inspect_gz_headers(dir: &Path) -> Result<Vec<(String, Option<String>)>> {
    let files = fs::list_files(dir, |name| name.ends_with(".gz"))?;
    let mut out = Vec::with_capacity(files.len());
    for f in files {
        let first = match xopen::is_gzipped(&f) {
            Ok(true) => fastq::first_header(&f).ok().flatten(),
            _ => None,
        };
        out.push((fs::file_name(&f).to_string(), first));
    }
    Ok(out)
}
