use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use methkit::fastq_index::{self, Comparison};
use methkit::io::fasta::{fai_path, FaiIndex};
use methkit::io::fastq::FastqReader;
use methkit::io::xopen;
use methkit::motif::{self, AppendOutcome, CmerStrand, MotifOpt};
use methkit::reference;
use methkit::runs;
use methkit::table::{self, RatioMode};
use methkit::trim::{self, TrimOpt};
use methkit::util::dna;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "methkit", author, version, about = "Utilities for DNA-methylation sequencing runs", arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Identify the adapter index of FASTQ files (TSV to stdout)
    Index {
        /// FASTQ file or directory of FASTQ files
        path: PathBuf,
        /// File suffix to pick up when PATH is a directory
        #[arg(long, default_value = "gz")]
        suffix: String,
    },
    /// Compare observed indexes with the expected ones in a sample CSV
    Compare {
        dir: PathBuf,
        /// CSV with SampleID and Index columns
        csv: PathBuf,
        /// Print the full joined table even when everything matches
        #[arg(long)]
        merge: bool,
    },
    /// Print the first header line of every .gz file in a directory
    Peek { dir: PathBuf },
    /// Append a Motif column to a site table
    Motif {
        in_tsv: PathBuf,
        out_tsv: PathBuf,
        /// Reference FASTA (a .fai is built if missing)
        fasta: PathBuf,
        #[arg(long = "motif-len", default_value_t = 3)]
        motif_len: usize,
        /// 1-based columns of chrom, pos and strand
        #[arg(long, value_delimiter = ',', default_value = "2,3,4")]
        fields: Vec<usize>,
    },
    /// Build a samtools-compatible .fai next to the FASTA
    Faidx { fasta: PathBuf },
    /// List 1-based positions of the target C of a C-mer
    Cmers {
        fasta: PathBuf,
        cmer: String,
        /// Offset of the target C inside the C-mer
        #[arg(long = "c-offset", default_value_t = 0)]
        c_offset: usize,
        /// pos, neg or both
        #[arg(long, default_value = "both")]
        strand: CmerStrand,
        /// Sequence to search (required when the FASTA holds several)
        #[arg(long = "chr")]
        chr: Option<String>,
    },
    /// Merge FASTQ files of several runs by sample and strand
    MergeRuns {
        out_dir: PathBuf,
        #[arg(required = true)]
        run_dirs: Vec<PathBuf>,
        /// Write plain FASTQ instead of gzip
        #[arg(long = "no-compress")]
        no_compress: bool,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
    },
    /// Join a sample CSV with the FASTQ files of a directory
    SampleSheet {
        in_csv: PathBuf,
        dir: PathBuf,
        #[arg(long = "out-csv", default_value = "sample_fname.csv")]
        out_csv: String,
    },
    /// Copy sequencer-named FASTQ files to <SOURCE>_renamed with normalized names
    Rename { source_dir: PathBuf },
    /// Per-sample conversion ratios of a site table
    Ratios {
        tsv: PathBuf,
        /// Minimum depth of a site to be counted
        #[arg(long, default_value_t = 1)]
        depth: u64,
        /// Break ratios down by CG/CHG/CHH context
        #[arg(long = "by-motif")]
        by_motif: bool,
        /// Keep only chromosomes 1..22, X, Y
        #[arg(long)]
        human: bool,
    },
    /// Binned conversion ratios (or mean depth) of a site table
    Windows {
        tsv: PathBuf,
        /// Window size in bases
        #[arg(long, default_value_t = 1_000_000)]
        size: u64,
        /// Report the converted fraction (BAT-seq) instead of the unconverted one
        #[arg(long)]
        converted: bool,
        /// Mean depth per strand instead of ratios
        #[arg(long)]
        depth: bool,
        /// Lay human chromosomes 1..22, X, Y end to end before binning
        #[arg(long)]
        continuous: bool,
    },
    /// Map FASTA headers to the *.fa file that holds them
    Refmap { dir: PathBuf },
    /// Mott quality trimming of a FASTQ file
    Trim {
        fastq: PathBuf,
        /// Output FASTQ (stdout if omitted; gzip if it ends in .gz)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Error probability cutoff
        #[arg(long, default_value_t = 0.05)]
        cutoff: f64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Index { path, suffix } => run_index(&path, &suffix),
        Commands::Compare { dir, csv, merge } => run_compare(&dir, &csv, merge),
        Commands::Peek { dir } => run_peek(&dir),
        Commands::Motif { in_tsv, out_tsv, fasta, motif_len, fields } => {
            let fields: [usize; 3] = fields
                .try_into()
                .map_err(|f: Vec<usize>| anyhow!("--fields expects 3 columns, got {}", f.len()))?;
            let opt = MotifOpt { motif_len, fields };
            run_motif(&in_tsv, &out_tsv, &fasta, &opt)
        }
        Commands::Faidx { fasta } => run_faidx(&fasta),
        Commands::Cmers { fasta, cmer, c_offset, strand, chr } => {
            run_cmers(&fasta, &cmer, c_offset, strand, chr.as_deref())
        }
        Commands::MergeRuns { out_dir, run_dirs, no_compress, threads } => {
            if threads > 1 {
                rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
            }
            run_merge(&out_dir, &run_dirs, !no_compress)
        }
        Commands::SampleSheet { in_csv, dir, out_csv } => run_sample_sheet(&in_csv, &dir, &out_csv),
        Commands::Rename { source_dir } => run_rename(&source_dir),
        Commands::Ratios { tsv, depth, by_motif, human } => run_ratios(&tsv, depth, by_motif, human),
        Commands::Windows { tsv, size, converted, depth, continuous } => {
            run_windows(&tsv, size, converted, depth, continuous)
        }
        Commands::Refmap { dir } => run_refmap(&dir),
        Commands::Trim { fastq, out, cutoff } => {
            let opt = TrimOpt { cutoff, ..TrimOpt::default() };
            run_trim(&fastq, out.as_deref(), &opt)
        }
    }
}

fn stdout() -> BufWriter<std::io::StdoutLock<'static>> {
    BufWriter::new(std::io::stdout().lock())
}

fn run_index(path: &Path, suffix: &str) -> Result<()> {
    let records = fastq_index::identify_path(path, suffix)
        .map_err(|e| anyhow!("cannot identify indexes in '{}': {}", path.display(), e))?;
    log::info!("identified {} file(s)", records.len());
    if path.is_file() {
        // 单个文件只输出一行，不带表头
        let mut w = stdout();
        for r in &records {
            writeln!(w, "{}", r.to_tsv_line())?;
        }
        w.flush()?;
        return Ok(());
    }
    fastq_index::write_records(&records, stdout())
}

fn run_compare(dir: &Path, csv: &Path, merge: bool) -> Result<()> {
    let cmp = fastq_index::compare_indexes(dir, csv)?;
    match &cmp {
        Comparison::Matched(t) => {
            log::info!("all {} sample(s) match the expected index", t.rows.len());
            if merge {
                t.write_tsv(stdout())?;
            }
            Ok(())
        }
        Comparison::Mismatched(t) => {
            t.write_tsv(stdout())?;
            bail!("{} sample(s) do not match the expected index", t.rows.len())
        }
        Comparison::MissingIndexColumn(t) => t.write_tsv(stdout()),
    }
}

fn run_peek(dir: &Path) -> Result<()> {
    let mut w = stdout();
    for (name, header) in fastq_index::inspect_gz_headers(dir)? {
        match header {
            Some(h) => writeln!(w, "{}\t{}", name, h)?,
            None => writeln!(w, "{}\t-- skipped --", name)?,
        }
    }
    w.flush()?;
    Ok(())
}

fn run_motif(in_tsv: &Path, out_tsv: &Path, fasta: &Path, opt: &MotifOpt) -> Result<()> {
    match motif::append_motif(in_tsv, out_tsv, fasta, opt)? {
        AppendOutcome::Written { rows } => log::info!("{} row(s) written to {}", rows, out_tsv.display()),
        AppendOutcome::SameFile | AppendOutcome::AlreadyAnnotated => {}
    }
    Ok(())
}

fn run_faidx(fasta: &Path) -> Result<()> {
    let idx = FaiIndex::build(fasta).map_err(|e| anyhow!("cannot index FASTA '{}': {}", fasta.display(), e))?;
    let out = fai_path(fasta);
    idx.write(&out)
        .map_err(|e| anyhow!("cannot write index to '{}': {}", out.display(), e))?;
    log::info!("sequences: {}", idx.len());
    log::info!("index saved: {}", out.display());
    Ok(())
}

fn run_cmers(fasta: &Path, cmer: &str, c_offset: usize, strand: CmerStrand, chr: Option<&str>) -> Result<()> {
    let seq = dna::normalize_seq(&motif::read_sequence(fasta, chr)?);
    let positions = motif::find_cmers(&seq, cmer.as_bytes(), c_offset, strand)?;
    let mut w = stdout();
    for p in &positions {
        writeln!(w, "{}", p)?;
    }
    w.flush()?;
    log::info!("{} position(s) of {} found", positions.len(), cmer);
    Ok(())
}

fn run_merge(out_dir: &Path, run_dirs: &[PathBuf], compress: bool) -> Result<()> {
    let merged = runs::merge_runs(out_dir, run_dirs, compress)?;
    for m in &merged {
        println!("{}\t{} input(s)\t{} bytes", m.output.display(), m.inputs.len(), m.bytes);
    }
    Ok(())
}

fn run_sample_sheet(in_csv: &Path, dir: &Path, out_name: &str) -> Result<()> {
    let (out, rows) = runs::merge_sample_sheet(in_csv, dir, out_name)?;
    log::info!("{} row(s) written to {}", rows.len(), out.display());
    Ok(())
}

fn run_rename(source_dir: &Path) -> Result<()> {
    let (dest, renamed) = runs::rename_run_dir(source_dir)?;
    for (old, new) in &renamed {
        println!("{} -> {}", old, new);
    }
    log::info!("{} file(s) copied to {}", renamed.len(), dest.display());
    Ok(())
}

fn run_ratios(tsv: &Path, depth: u64, by_motif: bool, human: bool) -> Result<()> {
    let sites = if human { table::read_human_sites(tsv)? } else { table::read_sites(tsv)? };
    log::info!("{} site(s) read from {}", sites.len(), tsv.display());
    if by_motif {
        table::write_tsv(&table::motif_ratios(&sites, depth), stdout())
    } else {
        table::write_tsv(&table::conversion_ratios(&sites, depth), stdout())
    }
}

fn run_windows(tsv: &Path, size: u64, converted: bool, depth: bool, continuous: bool) -> Result<()> {
    let mut sites = if continuous { table::read_human_sites(tsv)? } else { table::read_sites(tsv)? };
    if continuous {
        table::continuous_positions(&mut sites);
    }
    if depth {
        return table::write_tsv(&table::depth_windows(&sites, size)?, stdout());
    }
    let mode = if converted { RatioMode::Converted } else { RatioMode::Unconverted };
    let mut windows = table::windows(&sites, size, mode)?;
    if continuous {
        // 连续坐标下窗口跨染色体，只按位置排序
        windows.sort_by_key(|w| w.pos);
    }
    table::write_tsv(&windows, stdout())
}

fn run_refmap(dir: &Path) -> Result<()> {
    let map = reference::fasta_map(dir)?;
    let mut w = stdout();
    for (file, chroms) in reference::refs_by_fasta(&map) {
        writeln!(w, "{}\t{}", file, chroms.join(","))?;
    }
    w.flush()?;
    Ok(())
}

fn run_trim(fastq: &Path, out: Option<&Path>, opt: &TrimOpt) -> Result<()> {
    let mut reader = FastqReader::from_path(fastq)
        .map_err(|e| anyhow!("cannot open FASTQ '{}': {}", fastq.display(), e))?;

    let (n, kept_bases, total_bases) = match out {
        Some(p) => {
            let mut w = xopen::create_writer(p)?;
            let stats = write_trimmed(&mut reader, &mut w, opt)?;
            w.finish()
                .map_err(|e| anyhow!("cannot finish '{}': {}", p.display(), e))?;
            stats
        }
        None => {
            let mut w = stdout();
            let stats = write_trimmed(&mut reader, &mut w, opt)?;
            w.flush()?;
            stats
        }
    };
    log::info!("trimmed {} read(s): kept {} of {} bases", n, kept_bases, total_bases);
    Ok(())
}

/// 返回 (读段数, 保留碱基数, 总碱基数)。
fn write_trimmed<R: BufRead, W: Write>(
    reader: &mut FastqReader<R>,
    w: &mut W,
    opt: &TrimOpt,
) -> Result<(usize, usize, usize)> {
    let (mut n, mut kept_bases, mut total_bases) = (0usize, 0usize, 0usize);
    while let Some(rec) = reader.next_record()? {
        let t = trim::trim_record(&rec, opt)?;
        n += 1;
        total_bases += rec.seq.len();
        kept_bases += t.seq.len();
        match &t.desc {
            Some(d) => writeln!(w, "@{} {}", t.id, d)?,
            None => writeln!(w, "@{}", t.id)?,
        }
        w.write_all(&t.seq)?;
        w.write_all(b"\n+\n")?;
        w.write_all(&t.qual)?;
        w.write_all(b"\n")?;
    }
    Ok((n, kept_bases, total_bases))
}
