use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use methkit::fastq_index::{self, Comparison};
use methkit::motif::{self, AppendOutcome, MotifOpt, MotifType};
use methkit::runs;
use methkit::table;

fn write_gz(path: &Path, body: &str) {
    let mut enc = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::fast());
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
}

fn read_gz(path: &Path) -> String {
    let mut s = String::new();
    MultiGzDecoder::new(std::fs::File::open(path).unwrap()).read_to_string(&mut s).unwrap();
    s
}

fn reference(dir: &Path) -> PathBuf {
    let p = dir.join("ref.fa");
    // chr1 = ACGTTCGCAGGC
    std::fs::write(&p, ">chr1 test\nACGTTC\nGCAGGC\n>chr2\nCCCAGG\n").unwrap();
    p
}

#[test]
fn merged_runs_keep_their_index() {
    let dir = tempfile::tempdir().unwrap();
    let (run1, run2) = (dir.path().join("run1"), dir.path().join("run2"));
    std::fs::create_dir(&run1).unwrap();
    std::fs::create_dir(&run2).unwrap();
    write_gz(&run1.join("1HS-A1_S1_R1_001.fastq.gz"), "@r1 1:N:0:TTACCGAC+AGATCTCG\nACGT\n+\nIIII\n");
    write_gz(&run2.join("2HS-A1_S7_R1_001.fastq.gz"), "@r2 1:N:0:TTACCGAC+AGATCTCG\nGGCC\n+\nIIII\n");
    write_gz(&run2.join("2HS-B1_S8_R2_001.fastq.gz"), "@r3 2:N:0:TCGTCTGA+NNNNNNNN\nTTTT\n+\nIIII\n");

    let out = dir.path().join("merged");
    let merged = runs::merge_runs(&out, &[&run1, &run2], true).unwrap();
    let keys: Vec<&str> = merged.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, vec!["A1_R1", "B1_R2"]);

    let a1 = out.join("A1_R1.fastq.gz");
    let body = read_gz(&a1);
    assert!(body.starts_with("@r1 "));
    assert!(body.contains("\nGGCC\n"));
    assert!(out.join(runs::MANIFEST_NAME).is_file());

    let recs = fastq_index::identify_path(&out, "gz").unwrap();
    let indexes: Vec<&str> = recs.iter().map(|r| r.index.as_str()).collect();
    assert_eq!(indexes.len(), 2);
    assert!(indexes.contains(&"A1"));
    assert!(indexes.contains(&"B1"));

    // 输出目录已存在时拒绝覆盖
    assert!(runs::merge_runs(&out, &[&run1], true).is_err());
}

#[test]
fn compare_against_sample_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("run");
    std::fs::create_dir(&run).unwrap();
    write_gz(&run.join("1HS-S1_S1_R1_001.fastq.gz"), "@r 1:N:0:ATCACGAT+NNNNNNNN\nA\n+\nI\n");
    write_gz(&run.join("1HS-S2_S2_R1_001.fastq.gz"), "@r 1:N:0:NNNNNNNN+CGGCATTA\nA\n+\nI\n");

    let csv = dir.path().join("expected.csv");
    std::fs::write(&csv, "SampleID,Index,Content\nS1,1,lambda\nS2,A12,pUC19\nS3,5,none\n").unwrap();
    match fastq_index::compare_indexes(&run, &csv).unwrap() {
        Comparison::Matched(t) => {
            assert_eq!(t.rows.len(), 2);
            assert_eq!(t.extra_columns, vec!["Content"]);
        }
        other => panic!("expected a full match, got {:?}", other),
    }

    std::fs::write(&csv, "SampleID,Index\nS1,2\nS2,A12\n").unwrap();
    let cmp = fastq_index::compare_indexes(&run, &csv).unwrap();
    assert!(!cmp.is_success());
    assert_eq!(cmp.table().rows.len(), 1);
    assert_eq!(cmp.table().rows[0].observed.sample_id, "S1");
}

#[test]
fn motif_annotation_feeds_context_ratios() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = reference(dir.path());
    let sites = dir.path().join("sites.tsv.gz");
    write_gz(
        &sites,
        "Sample\tChrom\tPos\tStrand\tConverted\tUnconverted\tDepth\n\
         S1\tchr1\t2\t+\t3\t1\t4\n\
         S1\tchr1\t6\t+\t1\t1\t2\n\
         S1\tchr1\t8\t+\t0\t2\t2\n\
         S1\tchr1\t11\t-\t2\t0\t2\n\
         S1\tchrZ\t5\t+\t1\t0\t1\n",
    );

    let out = dir.path().join("sites.motif.tsv.gz");
    let outcome = motif::append_motif(&sites, &out, &fasta, &MotifOpt::default()).unwrap();
    assert_eq!(outcome, AppendOutcome::Written { rows: 5 });

    let annotated = table::read_sites(&out).unwrap();
    let motifs: Vec<&str> = annotated.iter().map(|s| s.motif.as_str()).collect();
    assert_eq!(motifs, vec!["CGT", "CGC", "CAG", "CCT", "NNN"]);
    assert_eq!(annotated[4].motif_type(), MotifType::Other);

    let by_ctx = table::motif_ratios(&annotated, 2);
    let ctx: Vec<&str> = by_ctx.iter().map(|r| r.motif_type.as_str()).collect();
    assert_eq!(ctx, vec!["CG", "CHG", "CHH"]);
    assert_eq!(by_ctx[0].ratio_conv, 0.625);
    assert_eq!(by_ctx[1].ratio_unconv, 1.0);

    // 再次注释同一张表不会写出任何东西
    let again = dir.path().join("again.tsv");
    let outcome = motif::append_motif(&out, &again, &fasta, &MotifOpt::default()).unwrap();
    assert_eq!(outcome, AppendOutcome::AlreadyAnnotated);
    assert!(!again.exists());
}

#[test]
fn cli_faidx_writes_index() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = reference(dir.path());
    let out = Command::new(env!("CARGO_BIN_EXE_methkit"))
        .arg("faidx")
        .arg(&fasta)
        .output()
        .unwrap();
    assert!(out.status.success());
    let fai = std::fs::read_to_string(dir.path().join("ref.fa.fai")).unwrap();
    assert_eq!(fai, "chr1\t12\t11\t6\t7\nchr2\t6\t31\t6\t7\n");
}

#[test]
fn cli_cmers_lists_positions() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = reference(dir.path());
    let out = Command::new(env!("CARGO_BIN_EXE_methkit"))
        .args(["cmers", "--chr", "chr1", "--strand", "pos"])
        .arg(&fasta)
        .arg("CG")
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "2\n6\n");
}

#[test]
fn cli_compare_merge_prints_only_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("run");
    std::fs::create_dir(&run).unwrap();
    write_gz(&run.join("1HS-S1_S1_R1_001.fastq.gz"), "@r 1:N:0:ATCACGAT+NNNNNNNN\nA\n+\nI\n");
    write_gz(&run.join("1HS-S2_S2_R1_001.fastq.gz"), "@r 1:N:0:NNNNNNNN+CGGCATTA\nA\n+\nI\n");
    let csv = dir.path().join("expected.csv");
    std::fs::write(&csv, "SampleID,Index\nS1,1\nS2,A12\n").unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_methkit"))
        .arg("compare")
        .arg(&run)
        .arg(&csv)
        .arg("--merge")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("SampleID\tIndex_x\tFullID\tPath\tIndex_y\n"), "{}", stdout);
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.lines().all(|l| l.split('\t').count() == 5), "{}", stdout);
}

#[test]
fn cli_index_single_file_has_no_header() {
    let dir = tempfile::tempdir().unwrap();
    let fq = dir.path().join("1HS-S1_S1_R1_001.fastq.gz");
    write_gz(&fq, "@r 1:N:0:ATCACGAT+NNNNNNNN\nA\n+\nI\n");

    let out = Command::new(env!("CARGO_BIN_EXE_methkit")).arg("index").arg(&fq).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.lines().count(), 1, "{}", stdout);
    assert!(stdout.starts_with("S1\t1\tS1_R1\t"), "{}", stdout);

    // 目录仍然带表头
    let out = Command::new(env!("CARGO_BIN_EXE_methkit")).arg("index").arg(dir.path()).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("SampleID\tIndex\tFullID\tPath\n"), "{}", stdout);
}

#[test]
fn cli_trim_to_gz_is_complete() {
    let dir = tempfile::tempdir().unwrap();
    let fq = dir.path().join("reads.fastq");
    std::fs::write(&fq, "@r1\nACGTACGT\n+\nIIIIII##\n@r2\nGGGG\n+\nIIII\n").unwrap();
    let gz = dir.path().join("trimmed.fastq.gz");

    let out = Command::new(env!("CARGO_BIN_EXE_methkit"))
        .arg("trim")
        .arg(&fq)
        .arg("-o")
        .arg(&gz)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(out.stdout.is_empty());
    let body = read_gz(&gz);
    assert!(body.starts_with("@r1\n"), "{}", body);
    assert!(body.ends_with("@r2\nGGGG\n+\nIIII\n"), "{}", body);
}
