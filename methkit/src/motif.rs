//! 以 C 为起点的局部序列（motif）提取与甲基化上下文分类。

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use crate::io::fasta::{FastaReader, FetchError, IndexedFasta};
use crate::io::xopen;
use crate::util::dna;

/// 取不到序列时使用的占位碱基
const PLACEHOLDER: char = 'N';

#[derive(Debug, Clone)]
pub struct MotifOpt {
    /// motif 长度（从 C 开始计）
    pub motif_len: usize,
    /// chrom / pos / strand 三列的位置（1-based）
    pub fields: [usize; 3],
}

impl Default for MotifOpt {
    fn default() -> Self {
        Self { motif_len: 3, fields: [2, 3, 4] }
    }
}

/// 取 `pos`（1-based）处的 motif：`+` 链向右读 `len` 个碱基，其余链向左读并取反向互补。
/// 染色体不存在或区间非法时返回 `len` 个 `N`。
pub fn find_motif(fasta: &mut IndexedFasta, chrom: &str, pos: i64, strand: &str, len: usize) -> Result<String> {
    let placeholder = || PLACEHOLDER.to_string().repeat(len);
    let Ok(l) = i64::try_from(len) else {
        return Ok(placeholder());
    };
    // 坐标溢出等同于非法区间
    let range = if strand == "+" {
        pos.checked_sub(1).and_then(|s| s.checked_add(l).map(|e| (s, e)))
    } else {
        pos.checked_sub(l).map(|s| (s, pos))
    };
    let Some((start, end)) = range else {
        return Ok(placeholder());
    };
    let fetched = fasta.fetch(chrom, start, end);
    let fetched = if strand == "+" { fetched } else { fetched.map(|s| dna::revcomp(&s)) };
    match fetched {
        Ok(seq) => Ok(String::from_utf8_lossy(&seq).into_owned()),
        Err(FetchError::UnknownSequence(_)) | Err(FetchError::InvalidRange { .. }) => Ok(placeholder()),
        Err(e @ FetchError::Io(_)) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// 输入输出为同一文件，未写入
    SameFile,
    /// 表头已含 Motif 列，未写入
    AlreadyAnnotated,
    Written { rows: usize },
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// 在 TSV 末尾追加 `Motif` 列。输入可为 gzip（按内容判断），输出以 `.gz` 结尾时压缩。
pub fn append_motif(in_tsv: &Path, out_tsv: &Path, fasta_ref: &Path, opt: &MotifOpt) -> Result<AppendOutcome> {
    if same_file(in_tsv, out_tsv) {
        log::warn!("{} and {} are the same file", in_tsv.display(), out_tsv.display());
        return Ok(AppendOutcome::SameFile);
    }
    if opt.fields.iter().any(|&f| f == 0) {
        bail!("field positions are 1-based, got {:?}", opt.fields);
    }
    let [chrom_idx, pos_idx, strand_idx] = opt.fields.map(|f| f - 1);
    let min_cols = chrom_idx.max(pos_idx).max(strand_idx) + 1;

    let mut reader = xopen::open_reader(in_tsv)?;
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        bail!("'{}' is empty", in_tsv.display());
    }
    let header = line.trim_end_matches(['\n', '\r']).to_string();
    if header.contains("Motif") || header.contains("motif") {
        log::warn!("Motif previously appended to {}", in_tsv.display());
        return Ok(AppendOutcome::AlreadyAnnotated);
    }

    let mut fasta = IndexedFasta::open(fasta_ref)?;
    let mut out = xopen::create_writer(out_tsv)?;
    writeln!(out, "{}\tMotif", header)?;

    let mut rows = 0usize;
    let mut line_no = 1usize;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_no += 1;
        let row = line.trim_end_matches(['\n', '\r']);
        if row.is_empty() {
            continue;
        }
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < min_cols {
            bail!("{}:{}: expected at least {} columns, found {}", in_tsv.display(), line_no, min_cols, fields.len());
        }
        let pos: i64 = fields[pos_idx]
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}:{}: bad position '{}': {}", in_tsv.display(), line_no, fields[pos_idx], e))?;
        let motif = find_motif(&mut fasta, fields[chrom_idx], pos, fields[strand_idx], opt.motif_len)?;
        writeln!(out, "{}\t{}", row, motif)?;
        rows += 1;
    }
    out.finish()?;
    log::info!("appended motifs to {} row(s) -> {}", rows, out_tsv.display());
    Ok(AppendOutcome::Written { rows })
}

/// 甲基化上下文（H = A/C/T）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MotifType {
    CG,
    CHG,
    CHH,
    Other,
}

impl MotifType {
    pub fn as_str(self) -> &'static str {
        match self {
            MotifType::CG => "CG",
            MotifType::CHG => "CHG",
            MotifType::CHH => "CHH",
            MotifType::Other => "Other",
        }
    }
}

impl fmt::Display for MotifType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_motif(motif: &str) -> MotifType {
    let m = motif.as_bytes();
    if m.starts_with(b"CG") {
        return MotifType::CG;
    }
    if m.len() < 3 || m[0] != b'C' {
        return MotifType::Other;
    }
    if m[2] == b'G' {
        MotifType::CHG
    } else if m[1] != b'G' {
        MotifType::CHH
    } else {
        MotifType::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmerStrand {
    Pos,
    Neg,
    Both,
}

impl FromStr for CmerStrand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pos" | "+" => Ok(CmerStrand::Pos),
            "neg" | "-" => Ok(CmerStrand::Neg),
            "both" => Ok(CmerStrand::Both),
            other => Err(format!("unknown strand '{}', expected pos, neg or both", other)),
        }
    }
}

/// 查找 cmer 中目标 C 的位置（1-based，可重叠）。
/// 负链位置为该 C 在正链坐标上的对应位置（正链为 G）。
pub fn find_cmers(seq: &[u8], cmer: &[u8], c_offset: usize, strand: CmerStrand) -> Result<BTreeSet<usize>> {
    if cmer.is_empty() || !dna::is_acgt(cmer) || !cmer.contains(&b'C') {
        bail!("cmer must contain only \"ATCG\" and at least one \"C\"");
    }
    if cmer.get(c_offset) != Some(&b'C') {
        bail!("no C located in cmer={} at c_offset={}", String::from_utf8_lossy(cmer), c_offset);
    }
    let k = cmer.len();
    let mut hits = BTreeSet::new();
    if seq.len() < k {
        return Ok(hits);
    }

    if strand != CmerStrand::Neg {
        for (start, w) in seq.windows(k).enumerate() {
            if w == cmer {
                hits.insert(1 + c_offset + start);
            }
        }
    }
    if strand != CmerStrand::Pos {
        let comp = dna::complement_seq(seq);
        let rev: Vec<u8> = cmer.iter().rev().copied().collect();
        for (start, w) in comp.windows(k).enumerate() {
            if w == rev.as_slice() {
                hits.insert(k - c_offset + start);
            }
        }
    }
    Ok(hits)
}

/// 读取 FASTA 中的一条序列。未指定名称时文件只能含一条序列。
pub fn read_sequence(fasta: &Path, name: Option<&str>) -> Result<Vec<u8>> {
    let mut reader = FastaReader::new(xopen::open_reader(fasta)?);
    let mut first: Option<Vec<u8>> = None;
    while let Some(rec) = reader.next_record()? {
        match name {
            Some(n) if rec.id == n => return Ok(rec.seq),
            Some(_) => {}
            None if first.is_some() => {
                bail!("multiple sequences found in '{}'; specify a chromosome with --chr", fasta.display())
            }
            None => first = Some(rec.seq),
        }
    }
    match (name, first) {
        (None, Some(seq)) => Ok(seq),
        (Some(n), _) => bail!("no sequence named '{}' in '{}'", n, fasta.display()),
        (None, None) => bail!("FASTA file '{}' contains no sequences", fasta.display()),
    }
}
