//! Mott 改进修剪算法：按碱基错误率累计得分，保留得分最高的区段。

use anyhow::{bail, Result};
use std::ops::Range;

use crate::io::fastq::FastqRecord;

/// 短于等于该长度的读段不做修剪
pub const MIN_SEGMENT: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct TrimOpt {
    /// 错误概率阈值
    pub cutoff: f64,
    /// 质量字符偏移（Sanger 为 33）
    pub phred_offset: u8,
}

impl Default for TrimOpt {
    fn default() -> Self {
        Self { cutoff: 0.05, phred_offset: 33 }
    }
}

/// 对 phred 质量值（已减去偏移）计算保留区间 `[start, end)`。
pub fn mott_trim(qual: &[u8], cutoff: f64) -> Result<Range<usize>> {
    if qual.len() <= MIN_SEGMENT {
        bail!("read of length {} is not longer than the {}-base trim segment", qual.len(), MIN_SEGMENT);
    }

    let mut sum = 0.0f64;
    let mut best = 0.0f64;
    let mut end = 0usize;
    let mut start: Option<usize> = None;
    // 第一个碱基的累计值固定为 0
    for (i, &q) in qual.iter().enumerate().skip(1) {
        let v = sum + cutoff - 10f64.powf(q as f64 / -10.0);
        if v < 0.0 {
            sum = 0.0;
        } else {
            sum = v;
            start.get_or_insert(i);
        }
        if sum > best {
            best = sum;
            end = i;
        }
    }
    let start = start.unwrap_or(0).min(end);
    Ok(start..end)
}

/// 修剪一条 FASTQ 记录；过短的读段原样返回。
pub fn trim_record(rec: &FastqRecord, opt: &TrimOpt) -> Result<FastqRecord> {
    if rec.qual.len() <= MIN_SEGMENT {
        return Ok(rec.clone());
    }
    let phred: Vec<u8> = rec.qual.iter().map(|&c| c.saturating_sub(opt.phred_offset)).collect();
    let r = mott_trim(&phred, opt.cutoff)?;
    Ok(FastqRecord {
        id: rec.id.clone(),
        desc: rec.desc.clone(),
        seq: rec.seq[r.clone()].to_vec(),
        qual: rec.qual[r].to_vec(),
    })
}
