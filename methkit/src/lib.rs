//! # methkit
//!
//! 甲基化测序流程中的零散工具：接头 index 识别、多批次 FASTQ 合并、
//! 参考序列上的 motif 提取，以及分析位点表时常用的汇总变换。
//!
//! 各功能都是对平面文本 / 表格文件的独立变换，没有共享状态。
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use methkit::adapter;
//! use methkit::io::fasta::IndexedFasta;
//! use methkit::motif::{classify_motif, find_motif};
//!
//! // 从 FASTQ header 解析接头 index
//! let label = adapter::resolve_header("@A00:1:H:1:1101:1000:1000 1:N:0:CAGATC+ATCACG");
//! assert_eq!(label, Some("7"));
//!
//! // 取 chr1:100 正链上的三碱基 motif 并分类
//! let mut fa = IndexedFasta::open("genome.fa")?;
//! let motif = find_motif(&mut fa, "chr1", 100, "+", 3)?;
//! println!("{} {}", motif, classify_motif(&motif));
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — FASTA（含 `.fai` 随机访问）/ FASTQ 解析，透明 gzip 读写
//! - [`adapter`] — NEB 单端 / 双端 index 表与 barcode 解析
//! - [`sample`] — 测序文件名解析与重命名
//! - [`fastq_index`] — 批量识别 FASTQ 的 index 并与实验表比对
//! - [`motif`] — motif 提取、上下文分类、C-mer 定位
//! - [`runs`] — 多批次合并、样本表生成
//! - [`reference`] — 参考序列命名与 header 映射
//! - [`table`] — 位点表汇总（窗口、转化率、重复样本）
//! - [`trim`] — Mott 质量修剪
//! - [`util`] — 互补 / 反向互补、目录遍历

pub mod adapter;
pub mod fastq_index;
pub mod io;
pub mod motif;
pub mod reference;
pub mod runs;
pub mod sample;
pub mod table;
pub mod trim;
pub mod util;
