//! 测序文件名解析。
//!
//! 测序仪文件名形如 `2024HS-A1_S1_L001_R1_001.fastq.gz`：
//! 第一个 `-` 之后到下一个 `_` 为 SampleID，`_R1_` / `_R2_` 为读段方向。

use regex::Regex;
use std::sync::OnceLock;

fn sequencer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-(.+?)_.*_(R[12])_").expect("valid regex"))
}

fn run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^-]+-([A-Za-z0-9]+)_[^_]+_(R[12])_[^.]+\.(?:fastq|fq)\.gz$").expect("valid regex")
    })
}

fn fastx_gz_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*\.f[aq].*\.gz$").expect("valid regex"))
}

fn rename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)HS-(.+)(_R\d+)(\.fastq\.gz)$").expect("valid regex"))
}

fn dashed_well_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z])-(\d+)").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleName {
    pub sample_id: String,
    /// `R1` 或 `R2`
    pub strand: String,
}

impl SampleName {
    /// `{SampleID}_R{n}`
    pub fn full_id(&self) -> String {
        format!("{}_{}", self.sample_id, self.strand)
    }
}

/// 测序仪风格文件名：`-(.+?)_.*_(R[12])_`，在文件名任意位置搜索。
pub fn parse_sequencer_name(name: &str) -> Option<SampleName> {
    let caps = sequencer_re().captures(name)?;
    Some(SampleName {
        sample_id: caps[1].to_string(),
        strand: caps[2].to_string(),
    })
}

/// 合并多个 run 时使用的严格文件名格式（仅字母数字 SampleID，必须 `.fastq.gz` / `.fq.gz` 结尾）。
/// 返回 `{sample}_{strand}` 形式的 key。
pub fn run_key(name: &str) -> Option<String> {
    let caps = run_re().captures(name)?;
    Some(format!("{}_{}", &caps[1], &caps[2]))
}

/// `*.f[aq]*.gz`
pub fn is_fastx_gz(name: &str) -> bool {
    fastx_gz_re().is_match(name)
}

/// `123HS-A-1_R1.fastq.gz` → `123DZ-A1_S00_R1_001.fastq.gz`；不符合格式时返回 `None`。
pub fn rename_sequencer_name(name: &str) -> Option<String> {
    let caps = rename_re().captures(name)?;
    let ident = dashed_well_re().replace_all(&caps[2], "${1}${2}");
    Some(format!("{}DZ-{}_S00{}_001{}", &caps[1], ident, &caps[3], &caps[4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequencer_style() {
        let s = parse_sequencer_name("2024HS-A1_S1_L001_R2_001.fastq.gz").unwrap();
        assert_eq!(s.sample_id, "A1");
        assert_eq!(s.strand, "R2");
        assert_eq!(s.full_id(), "A1_R2");
    }

    #[test]
    fn sequencer_style_lazy_sample() {
        // SampleID 取到第一个 `_` 为止
        let s = parse_sequencer_name("x-B12_extra_R1_001.fq.gz").unwrap();
        assert_eq!(s.sample_id, "B12");
        assert!(parse_sequencer_name("A1_R1.fq.gz").is_none());
        assert!(parse_sequencer_name("x-A1_S1_R3_001.fq.gz").is_none());
    }

    #[test]
    fn run_style() {
        assert_eq!(run_key("123DZ-A1_S00_R1_001.fastq.gz").as_deref(), Some("A1_R1"));
        assert_eq!(run_key("run-7_S7_R2_001.fq.gz").as_deref(), Some("7_R2"));
        // SampleID 含下划线以外的符号不匹配
        assert_eq!(run_key("run-A.1_S1_R1_001.fastq.gz"), None);
        assert_eq!(run_key("run-A1_S1_R1_001.fastq"), None);
    }

    #[test]
    fn fastx_glob() {
        assert!(is_fastx_gz("a.fq.gz"));
        assert!(is_fastx_gz("a.fastq.gz"));
        assert!(is_fastx_gz("a.fa.gz"));
        assert!(!is_fastx_gz("a.tsv.gz"));
        assert!(!is_fastx_gz("a.fastq"));
    }

    #[test]
    fn rename_rule() {
        assert_eq!(
            rename_sequencer_name("123HS-A-1_R1.fastq.gz").as_deref(),
            Some("123DZ-A1_S00_R1_001.fastq.gz")
        );
        assert_eq!(
            rename_sequencer_name("9HS-ctl-B-12_R2.fastq.gz").as_deref(),
            Some("9DZ-ctl-B12_S00_R2_001.fastq.gz")
        );
        assert_eq!(rename_sequencer_name("123HS-A1_R1.fq.gz"), None);
    }
}
