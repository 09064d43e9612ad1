//! 位点表（每行一个 C 位点的转化计数）的常用汇总。

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use crate::io::xopen;
use crate::motif::{classify_motif, MotifType};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Site {
    #[serde(rename = "Sample", default)]
    pub sample: String,
    #[serde(rename = "Chrom")]
    pub chrom: String,
    #[serde(rename = "Pos")]
    pub pos: u64,
    #[serde(rename = "Strand", default)]
    pub strand: String,
    #[serde(rename = "Converted", default)]
    pub converted: u64,
    #[serde(rename = "Unconverted", default)]
    pub unconverted: u64,
    #[serde(rename = "Depth", default)]
    pub depth: u64,
    #[serde(rename = "Motif", default)]
    pub motif: String,
    /// 原始染色体内坐标（由 [`continuous_positions`] 填充）
    #[serde(skip)]
    pub pos_chrom: Option<u64>,
}

impl Site {
    pub fn motif_type(&self) -> MotifType {
        classify_motif(&self.motif)
    }
}

/// 读取 TSV（可为 gzip）；多余的列忽略。
pub fn read_sites(path: &Path) -> Result<Vec<Site>> {
    let reader = xopen::open_reader(path)?;
    let mut rdr = csv::ReaderBuilder::new().delimiter(b'\t').from_reader(reader);
    let mut sites = Vec::new();
    for (i, rec) in rdr.deserialize().enumerate() {
        let site: Site = rec.map_err(|e| anyhow!("{}: row {}: {}", path.display(), i + 2, e))?;
        sites.push(site);
    }
    Ok(sites)
}

/// 人类染色体顺序：1..22、X、Y；其它（线粒体、contig、spike-in）返回 `None`。
pub fn chrom_rank(chrom: &str) -> Option<u32> {
    match chrom {
        "X" => Some(23),
        "Y" => Some(24),
        _ if !chrom.is_empty() && chrom.bytes().all(|b| b.is_ascii_digit()) => {
            chrom.parse::<u32>().ok().filter(|n| (1..=22).contains(n))
        }
        _ => None,
    }
}

/// 排序键：人类染色体按自然顺序在前，其余按名称。
fn chrom_key(chrom: &str) -> (u32, String) {
    (chrom_rank(chrom).unwrap_or(u32::MAX), chrom.to_string())
}

/// 只保留 1..22/X/Y，并按染色体顺序稳定排序。
pub fn human_sites(mut sites: Vec<Site>) -> Vec<Site> {
    sites.retain(|s| chrom_rank(&s.chrom).is_some());
    sites.sort_by_key(|s| chrom_rank(&s.chrom));
    sites
}

pub fn read_human_sites(path: &Path) -> Result<Vec<Site>> {
    Ok(human_sites(read_sites(path)?))
}

/// 把各染色体坐标首尾相接成全基因组连续坐标，原坐标保存到 `pos_chrom`。
/// 每换一条染色体，偏移量取此前已生成坐标的最大值。
pub fn continuous_positions(sites: &mut [Site]) {
    let mut offset = 0u64;
    let mut max_seen = 0u64;
    let mut current: Option<String> = None;
    for s in sites.iter_mut() {
        let orig = s.pos_chrom.unwrap_or(s.pos);
        if current.as_deref() != Some(s.chrom.as_str()) {
            current = Some(s.chrom.clone());
            offset = offset.max(max_seen);
        }
        s.pos_chrom = Some(orig);
        s.pos = offset + orig;
        max_seen = max_seen.max(s.pos);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatioMode {
    /// UBS-seq：未转化比例
    Unconverted,
    /// BAT-seq：转化比例
    Converted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    #[serde(rename = "Chrom")]
    pub chrom: String,
    #[serde(rename = "Pos")]
    pub pos: u64,
    #[serde(rename = "Unconverted")]
    pub unconverted: u64,
    #[serde(rename = "Converted")]
    pub converted: u64,
    #[serde(rename = "Ratio")]
    pub ratio: f64,
}

pub fn windows(sites: &[Site], size: u64, mode: RatioMode) -> Result<Vec<Window>> {
    if size == 0 {
        bail!("window size must be positive");
    }
    let mut acc: BTreeMap<((u32, String), u64), (u64, u64)> = BTreeMap::new();
    for s in sites {
        let e = acc.entry((chrom_key(&s.chrom), s.pos / size * size)).or_default();
        e.0 += s.unconverted;
        e.1 += s.converted;
    }
    Ok(acc
        .into_iter()
        .map(|(((_, chrom), pos), (unconverted, converted))| {
            let total = (converted + unconverted) as f64;
            let num = match mode {
                RatioMode::Unconverted => unconverted,
                RatioMode::Converted => converted,
            };
            Window { chrom, pos, unconverted, converted, ratio: num as f64 / total }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthWindow {
    #[serde(rename = "Strand")]
    pub strand: String,
    #[serde(rename = "Depth")]
    pub depth: f64,
    /// 窗口内第一个位点的坐标
    #[serde(rename = "Pos")]
    pub pos: u64,
}

/// 按 (链, 窗口) 求平均深度。
pub fn depth_windows(sites: &[Site], size: u64) -> Result<Vec<DepthWindow>> {
    if size == 0 {
        bail!("window size must be positive");
    }
    // (sum, count, first_pos)
    let mut acc: BTreeMap<(String, u64), (u64, u64, u64)> = BTreeMap::new();
    for s in sites {
        let e = acc.entry((s.strand.clone(), s.pos / size * size)).or_insert((0, 0, s.pos));
        e.0 += s.depth;
        e.1 += 1;
    }
    Ok(acc
        .into_iter()
        .map(|((strand, _), (sum, n, first))| DepthWindow { strand, depth: sum as f64 / n as f64, pos: first })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRatio {
    #[serde(rename = "Sample")]
    pub sample: String,
    #[serde(rename = "Ratio_conv")]
    pub ratio_conv: f64,
    #[serde(rename = "Ratio_unconv")]
    pub ratio_unconv: f64,
}

/// 每个样本在 `depth >= min_depth` 位点上的总转化 / 未转化比例。
pub fn conversion_ratios(sites: &[Site], min_depth: u64) -> Vec<SampleRatio> {
    let mut acc: BTreeMap<&str, (u64, u64, u64)> = BTreeMap::new();
    for s in sites.iter().filter(|s| s.depth >= min_depth) {
        let e = acc.entry(s.sample.as_str()).or_default();
        e.0 += s.converted;
        e.1 += s.unconverted;
        e.2 += s.depth;
    }
    acc.into_iter()
        .map(|(sample, (conv, unconv, depth))| SampleRatio {
            sample: sample.to_string(),
            ratio_conv: conv as f64 / depth as f64,
            ratio_unconv: unconv as f64 / depth as f64,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotifRatio {
    #[serde(rename = "Sample")]
    pub sample: String,
    #[serde(rename = "Motif_type")]
    pub motif_type: String,
    #[serde(rename = "Ratio_conv")]
    pub ratio_conv: f64,
    #[serde(rename = "Ratio_unconv")]
    pub ratio_unconv: f64,
}

/// 每个 (样本, 上下文) 的位点级比例均值。
pub fn motif_ratios(sites: &[Site], min_depth: u64) -> Vec<MotifRatio> {
    // (sum_conv, sum_unconv, n)
    let mut acc: BTreeMap<(&str, MotifType), (f64, f64, u64)> = BTreeMap::new();
    for s in sites.iter().filter(|s| s.depth >= min_depth && s.depth > 0) {
        let e = acc.entry((s.sample.as_str(), s.motif_type())).or_default();
        e.0 += s.converted as f64 / s.depth as f64;
        e.1 += s.unconverted as f64 / s.depth as f64;
        e.2 += 1;
    }
    acc.into_iter()
        .map(|((sample, mt), (c, u, n))| MotifRatio {
            sample: sample.to_string(),
            motif_type: mt.to_string(),
            ratio_conv: c / n as f64,
            ratio_unconv: u / n as f64,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    /// 连续每 n 行为一组，n 必须整除行数
    Size(usize),
    /// 显式给出每组的行号（0-based）
    Explicit(Vec<Vec<usize>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicateSummary {
    #[serde(rename = "SampleID")]
    pub sample: String,
    pub mean: f64,
    /// 样本标准差（n-1）；有效值少于 2 个时为 NaN
    pub std: f64,
}

/// 按组汇总重复样本：取组内第一个样本名、均值与标准差（忽略 NaN）。
pub fn aggregate_replicates(rows: &[(String, f64)], grouping: &Grouping) -> Result<Vec<ReplicateSummary>> {
    let groups: Vec<Vec<usize>> = match grouping {
        Grouping::Size(0) => bail!("group size must be positive"),
        Grouping::Size(n) => {
            if rows.len() % n != 0 {
                bail!("{} rows cannot be split into groups of {}", rows.len(), n);
            }
            (0..rows.len()).collect::<Vec<_>>().chunks(*n).map(<[usize]>::to_vec).collect()
        }
        Grouping::Explicit(g) => {
            if let Some(&bad) = g.iter().flatten().find(|&&i| i >= rows.len()) {
                bail!("row index {} out of range ({} rows)", bad, rows.len());
            }
            g.iter().filter(|g| !g.is_empty()).cloned().collect()
        }
    };

    Ok(groups
        .iter()
        .map(|idx| {
            let vals: Vec<f64> = idx.iter().map(|&i| rows[i].1).filter(|v| !v.is_nan()).collect();
            let n = vals.len() as f64;
            let mean = if vals.is_empty() { f64::NAN } else { vals.iter().sum::<f64>() / n };
            let std = if vals.len() < 2 {
                f64::NAN
            } else {
                (vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
            };
            ReplicateSummary { sample: rows[idx[0]].0.clone(), mean, std }
        })
        .collect())
}

/// 将标题转为可作文件名的形式：非字母数字替换为 `_`，空白压缩为 `_`，去掉首尾 `_`。
pub fn sanitize(title: &str) -> String {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    let [special, space, under] = RES.get_or_init(|| {
        [
            Regex::new(r"[^a-zA-Z0-9\s]").expect("valid regex"),
            Regex::new(r"\s+").expect("valid regex"),
            Regex::new(r"_+").expect("valid regex"),
        ]
    });
    let s = special.replace_all(title, "_");
    let s = space.replace_all(&s, "_");
    let s = under.replace_all(&s, "_");
    s.trim_matches('_').to_string()
}

/// 以 TSV 输出任意可序列化的行。
pub fn write_tsv<T: Serialize, W: Write>(rows: &[T], w: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(w);
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}
