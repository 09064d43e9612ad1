use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Write;

use methkit::adapter;
use methkit::io::fasta::IndexedFasta;
use methkit::motif::{self, CmerStrand};
use methkit::trim;
use methkit::util::dna;

fn make_reference(len: usize) -> Vec<u8> {
    let bases = [b'A', b'C', b'G', b'T'];
    let mut seq = Vec::with_capacity(len);
    let mut x: u32 = 42;
    for _ in 0..len {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        seq.push(bases[(x >> 16) as usize % 4]);
    }
    seq
}

fn bench_revcomp(c: &mut Criterion) {
    let seq = make_reference(10_000);
    c.bench_function("revcomp_10kb", |b| {
        b.iter(|| {
            black_box(dna::revcomp(black_box(&seq)));
        })
    });
}

fn bench_resolve_header(c: &mut Criterion) {
    let headers = [
        "@A00:1:H:1:1101:1000:1000 1:N:0:TTACCGAC+AGATCTCG",
        "@A00:1:H:1:1101:1000:1000 1:N:0:NNNNNNNN+CGGCATTA",
        "@A00:1:H:1:1101:1000:1000 1:N:0:CAGATCAT+ATCTCGTA",
        "@A00:1:H:1:1101:1000:1000 1:N:0:GGGGGGGG+GGGGGGGG",
    ];
    c.bench_function("resolve_header", |b| {
        b.iter(|| {
            for h in &headers {
                black_box(adapter::resolve_header(black_box(h)));
            }
        })
    });
}

fn bench_find_motif(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench.fa");
    let reference = make_reference(100_000);
    {
        let mut f = std::fs::File::create(&path).expect("create fasta");
        writeln!(f, ">bench").expect("write");
        for line in reference.chunks(60) {
            f.write_all(line).expect("write");
            f.write_all(b"\n").expect("write");
        }
    }
    let mut fa = IndexedFasta::open(&path).expect("open fasta");

    c.bench_function("find_motif_1k_sites", |b| {
        b.iter(|| {
            for pos in (10..100_000).step_by(100) {
                let strand = if pos % 200 == 10 { "+" } else { "-" };
                black_box(motif::find_motif(&mut fa, "bench", pos, strand, 3).expect("fetch"));
            }
        })
    });
}

fn bench_find_cmers(c: &mut Criterion) {
    let seq = make_reference(100_000);
    c.bench_function("find_cmers_100kb", |b| {
        b.iter(|| {
            black_box(motif::find_cmers(black_box(&seq), b"CG", 0, CmerStrand::Both).expect("valid cmer"));
        })
    });
}

fn bench_mott_trim(c: &mut Criterion) {
    let qual: Vec<u8> = (0..150u32).map(|i| if i < 10 || i > 130 { 5 } else { 35 }).collect();
    c.bench_function("mott_trim_150bp", |b| {
        b.iter(|| {
            black_box(trim::mott_trim(black_box(&qual), 0.05).expect("long read"));
        })
    });
}

criterion_group!(benches, bench_revcomp, bench_resolve_header, bench_find_motif, bench_find_cmers, bench_mott_trim);
criterion_main!(benches);
