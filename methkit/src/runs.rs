//! 同一实验多次上机（run）的文件整理：按 sample + 读段方向归并、生成样本表、批量改名。

use anyhow::{anyhow, bail, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::io::xopen;
use crate::sample;
use crate::util::fs;

pub const MANIFEST_NAME: &str = "merge_manifest.tsv";

/// 单个 run 目录：`{sample}_{strand}` → 文件名。
pub fn map_run(run_dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for f in fs::list_files(run_dir, |name| name.ends_with(".gz"))? {
        let name = fs::file_name(&f);
        if let Some(key) = sample::run_key(name) {
            out.insert(key, name.to_string());
        }
    }
    Ok(out)
}

/// 多个 run 目录：`{sample}_{strand}` → 各目录中的完整路径（按目录顺序）。
pub fn map_all_runs<P: AsRef<Path>>(run_dirs: &[P]) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut matched: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for dir in run_dirs {
        let dir = dir.as_ref();
        for (key, name) in map_run(dir)? {
            matched.entry(key).or_default().push(dir.join(name));
        }
    }
    Ok(matched)
}

#[derive(Debug, Clone)]
pub struct MergedSample {
    pub key: String,
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
    /// 解压后的字节数
    pub bytes: u64,
}

/// `A1_S1_R1_001.fastq.gz` → `.fastq`
fn inner_ext(path: &Path) -> String {
    let name = fs::file_name(path);
    let stem = name.strip_suffix(".gz").unwrap_or(name);
    match stem.rfind('.') {
        Some(i) => stem[i..].to_string(),
        None => String::new(),
    }
}

fn concat_into<W: Write>(inputs: &[PathBuf], sink: &mut W) -> Result<u64> {
    let mut bytes = 0u64;
    for input in inputs {
        let mut reader = xopen::open_reader(input)?;
        bytes += std::io::copy(&mut reader, sink).map_err(|e| anyhow!("cannot copy '{}': {}", input.display(), e))?;
    }
    Ok(bytes)
}

fn merge_one(out_dir: &Path, key: &str, inputs: &[PathBuf], compress: bool) -> Result<MergedSample> {
    let first = inputs.first().ok_or_else(|| anyhow!("no input files for '{}'", key))?;
    let mut name = format!("{}{}", key, inner_ext(first));
    if compress {
        name.push_str(".gz");
    }
    let output = out_dir.join(name);
    let fh = File::create(&output).map_err(|e| anyhow!("cannot create '{}': {}", output.display(), e))?;
    let sink = BufWriter::with_capacity(1 << 20, fh);

    let bytes = if compress {
        let mut enc = GzEncoder::new(sink, Compression::default());
        let n = concat_into(inputs, &mut enc)?;
        enc.finish()?.flush()?;
        n
    } else {
        let mut sink = sink;
        let n = concat_into(inputs, &mut sink)?;
        sink.flush()?;
        n
    };

    if compress {
        log::info!("Merged and compressed: {}", output.display());
    } else {
        log::info!("Merged: {}", output.display());
    }
    Ok(MergedSample { key: key.to_string(), output, inputs: inputs.to_vec(), bytes })
}

/// 合并多个 run 目录中 key 相同的文件到 `out_dir`（目录必须不存在）。
/// 每个 key 独立处理，并行执行。
pub fn merge_runs<P: AsRef<Path>>(out_dir: &Path, run_dirs: &[P], compress: bool) -> Result<Vec<MergedSample>> {
    if out_dir.exists() {
        bail!("The '{}' directory already exists.", out_dir.display());
    }
    let matched = map_all_runs(run_dirs)?;
    std::fs::create_dir(out_dir).map_err(|e| anyhow!("cannot create '{}': {}", out_dir.display(), e))?;

    let jobs: Vec<(String, Vec<PathBuf>)> = matched.into_iter().collect();
    let merged: Vec<MergedSample> = jobs
        .par_iter()
        .map(|(key, inputs)| merge_one(out_dir, key, inputs, compress))
        .collect::<Result<_>>()?;

    write_manifest(&out_dir.join(MANIFEST_NAME), &merged)?;
    log::info!("Files merged successfully in the '{}' directory.", out_dir.display());
    Ok(merged)
}

fn write_manifest(path: &Path, merged: &[MergedSample]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "# merged at {}", chrono::Utc::now().to_rfc3339())?;
    writeln!(w, "key\toutput\tinputs")?;
    for m in merged {
        let inputs: Vec<String> = m.inputs.iter().map(|p| p.display().to_string()).collect();
        writeln!(w, "{}\t{}\t{}", m.key, fs::file_name(&m.output), inputs.join(","))?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetRow {
    #[serde(rename = "SampleID")]
    pub sample_id: String,
    #[serde(rename = "Std")]
    pub std: String,
    #[serde(rename = "FullID")]
    pub full_id: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "Sequence")]
    pub sequence: String,
}

/// 将样本表（需含 SampleID、Content 列）与目录中的 FASTQ 文件按 SampleID 内连接，
/// 结果写到输入 CSV 同目录下的 `out_name`。
pub fn merge_sample_sheet(in_csv: &Path, dir: &Path, out_name: &str) -> Result<(PathBuf, Vec<SheetRow>)> {
    if !in_csv.is_file() {
        bail!("{} is not a valid file", in_csv.display());
    }
    if !dir.is_dir() {
        bail!("{} is not a valid directory", dir.display());
    }

    let dir_name = fs::file_name(dir).to_string();
    let mut files: Vec<(sample::SampleName, String)> = Vec::new();
    for f in fs::list_files(dir, sample::is_fastx_gz)? {
        let name = fs::file_name(&f);
        if let Some(s) = sample::parse_sequencer_name(name) {
            files.push((s, format!("{}/{}", dir_name, name)));
        }
    }

    let mut rdr = csv::Reader::from_path(in_csv).map_err(|e| anyhow!("cannot open CSV '{}': {}", in_csv.display(), e))?;
    let headers = rdr.headers()?.clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("CSV '{}' has no '{}' column", in_csv.display(), name))
    };
    let (sample_col, content_col) = (col("SampleID")?, col("Content")?);

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let id = rec.get(sample_col).unwrap_or("");
        let content = rec.get(content_col).unwrap_or("");
        for (s, seq) in files.iter().filter(|(s, _)| s.sample_id == id) {
            rows.push(SheetRow {
                sample_id: s.sample_id.clone(),
                std: s.strand.clone(),
                full_id: s.full_id(),
                content: content.to_string(),
                sequence: seq.clone(),
            });
        }
    }

    let out_path = in_csv.parent().unwrap_or_else(|| Path::new(".")).join(out_name);
    let mut wtr = csv::Writer::from_path(&out_path).map_err(|e| anyhow!("cannot write '{}': {}", out_path.display(), e))?;
    if rows.is_empty() {
        wtr.write_record(["SampleID", "Std", "FullID", "Content", "Sequence"])?;
    }
    for r in &rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    log::info!("Results written to {}", out_path.display());
    Ok((out_path, rows))
}

/// 将 `NNNHS-...` 命名的文件复制为 `NNNDZ-..._S00_Rn_001.fastq.gz` 到 `<source>_renamed`。
pub fn rename_run_dir(source_dir: &Path) -> Result<(PathBuf, Vec<(String, String)>)> {
    let source_dir = source_dir
        .canonicalize()
        .map_err(|e| anyhow!("cannot resolve '{}': {}", source_dir.display(), e))?;
    let base = fs::file_name(&source_dir).to_string();
    let parent = source_dir.parent().unwrap_or_else(|| Path::new("/"));
    let dest_dir = parent.join(format!("{}_renamed", base));
    std::fs::create_dir_all(&dest_dir)?;

    let mut renamed = Vec::new();
    for f in fs::list_files(&source_dir, |name| name.ends_with(".fastq.gz"))? {
        let name = fs::file_name(&f).to_string();
        match sample::rename_sequencer_name(&name) {
            Some(new_name) => {
                std::fs::copy(&f, dest_dir.join(&new_name))
                    .map_err(|e| anyhow!("cannot copy '{}': {}", f.display(), e))?;
                log::info!("Copied and renamed: {} -> {}", name, new_name);
                renamed.push((name, new_name));
            }
            None => log::warn!("Skipping file (doesn't match pattern): {}", name),
        }
    }
    log::info!("Renaming complete. Renamed files are in: {}", dest_dir.display());
    Ok((dest_dir, renamed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn gz(path: &Path, body: &str) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap();
    }

    fn two_runs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let r1 = tmp.path().join("run1");
        let r2 = tmp.path().join("run2");
        std::fs::create_dir(&r1).unwrap();
        std::fs::create_dir(&r2).unwrap();
        gz(&r1.join("1DZ-A1_S1_R1_001.fastq.gz"), "@a\nA\n+\nI\n");
        gz(&r1.join("1DZ-A1_S1_R2_001.fastq.gz"), "@b\nC\n+\nI\n");
        gz(&r2.join("2DZ-A1_S5_R1_001.fastq.gz"), "@c\nG\n+\nI\n");
        gz(&r2.join("2DZ-B2_S6_R1_001.fq.gz"), "@d\nT\n+\nI\n");
        std::fs::write(r2.join("readme.txt"), "x").unwrap();
        (tmp, r1, r2)
    }

    #[test]
    fn map_across_runs() {
        let (_t, r1, r2) = two_runs();
        let m = map_all_runs(&[&r1, &r2]).unwrap();
        assert_eq!(m.keys().cloned().collect::<Vec<_>>(), vec!["A1_R1", "A1_R2", "B2_R1"]);
        assert_eq!(m["A1_R1"], vec![r1.join("1DZ-A1_S1_R1_001.fastq.gz"), r2.join("2DZ-A1_S5_R1_001.fastq.gz")]);
        assert_eq!(m["B2_R1"].len(), 1);
    }

    #[test]
    fn merge_concatenates_in_run_order() {
        let (t, r1, r2) = two_runs();
        let out = t.path().join("merged");
        let merged = merge_runs(&out, &[&r1, &r2], true).unwrap();
        assert_eq!(merged.len(), 3);

        let a1 = out.join("A1_R1.fastq.gz");
        let mut s = String::new();
        xopen::open_reader(&a1).unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "@a\nA\n+\nI\n@c\nG\n+\nI\n");
        assert!(out.join("B2_R1.fq.gz").is_file());

        let manifest = std::fs::read_to_string(out.join(MANIFEST_NAME)).unwrap();
        assert!(manifest.starts_with("# merged at "));
        assert!(manifest.contains("A1_R2\tA1_R2.fastq.gz\t"));
    }

    #[test]
    fn merge_uncompressed_and_existing_dir() {
        let (t, r1, r2) = two_runs();
        let out = t.path().join("plain");
        merge_runs(&out, &[&r1, &r2], false).unwrap();
        assert_eq!(std::fs::read_to_string(out.join("A1_R2.fastq")).unwrap(), "@b\nC\n+\nI\n");
        assert!(merge_runs(&out, &[&r1], false).is_err());
    }

    #[test]
    fn sample_sheet_join() {
        let tmp = tempfile::tempdir().unwrap();
        let fq = tmp.path().join("fastq");
        std::fs::create_dir(&fq).unwrap();
        for n in ["x-S1_L1_R1_001.fq.gz", "x-S1_L1_R2_001.fq.gz", "x-S3_L1_R1_001.fq.gz", "x-S1_L1_R1_001.txt.gz"] {
            std::fs::write(fq.join(n), "").unwrap();
        }
        let csv = tmp.path().join("samples.csv");
        std::fs::write(&csv, "SampleID,Content,Extra\nS1,ctrl,1\nS2,none,2\n").unwrap();

        let (out, rows) = merge_sample_sheet(&csv, &fq, "sample_fname.csv").unwrap();
        assert_eq!(out, tmp.path().join("sample_fname.csv"));
        assert_eq!(rows.len(), 2);
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            text,
            "SampleID,Std,FullID,Content,Sequence\nS1,R1,S1_R1,ctrl,fastq/x-S1_L1_R1_001.fq.gz\nS1,R2,S1_R2,ctrl,fastq/x-S1_L1_R2_001.fq.gz\n"
        );
    }

    #[test]
    fn sample_sheet_requires_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = tmp.path().join("s.csv");
        std::fs::write(&csv, "SampleID\nS1\n").unwrap();
        assert!(merge_sample_sheet(&csv, tmp.path(), "o.csv").is_err());
    }

    #[test]
    fn rename_copies_matching_files() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("batch");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("12HS-A-1_R1.fastq.gz"), "a").unwrap();
        std::fs::write(src.join("other.fastq.gz"), "b").unwrap();

        let (dest, renamed) = rename_run_dir(&src).unwrap();
        assert_eq!(fs::file_name(&dest), "batch_renamed");
        assert_eq!(renamed, vec![("12HS-A-1_R1.fastq.gz".to_string(), "12DZ-A1_S00_R1_001.fastq.gz".to_string())]);
        assert_eq!(std::fs::read_to_string(dest.join("12DZ-A1_S00_R1_001.fastq.gz")).unwrap(), "a");
        assert!(src.join("12HS-A-1_R1.fastq.gz").exists());
    }
}
