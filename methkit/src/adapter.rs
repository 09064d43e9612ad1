//! NEB 建库 index 查表。
//!
//! FASTQ header 末字段形如 `ATCACGTT+CGTATTCG`：左右两个 key 各 8 nt。
//! - NEB Single Index 为左 key 的前 6 nt；
//! - NEB Dual Index 为完整的左 key（i7）或右 key。
//!
//! 一个文件只应解析出一个 index。

use std::collections::HashMap;
use std::sync::OnceLock;

/// 单端 index 长度（nt）
pub const SINGLE_INDEX_LEN: usize = 6;

/// NEB Single Index → 编号 1..48
const NEB_SINGLE: [(&str, &str); 48] = [
    ("ATCACG", "1"), ("CGATGT", "2"), ("TTAGGC", "3"), ("TGACCA", "4"), ("ACAGTG", "5"),
    ("GCCAAT", "6"), ("CAGATC", "7"), ("ACTTGA", "8"), ("GATCAG", "9"), ("TAGCTT", "10"),
    ("GGCTAC", "11"), ("CTTGTA", "12"), ("AGTCAA", "13"), ("AGTTCC", "14"), ("ATGTCA", "15"),
    ("CCGTCC", "16"), ("GTAGAG", "17"), ("GTCCGC", "18"), ("GTGAAA", "19"), ("GTGGCC", "20"),
    ("GTTTCG", "21"), ("CGTACG", "22"), ("GAGTGG", "23"), ("GGTAGC", "24"), ("ACTGAT", "25"),
    ("ATGAGC", "26"), ("ATTCCT", "27"), ("CAAAAG", "28"), ("CAACTA", "29"), ("CACCGG", "30"),
    ("CACGAT", "31"), ("CACTCA", "32"), ("CAGGCG", "33"), ("CATGGC", "34"), ("CATTTT", "35"),
    ("CCAACA", "36"), ("CGGAAT", "37"), ("CTAGCT", "38"), ("CTATAC", "39"), ("GTGATC", "40"),
    ("GACGAC", "41"), ("TAATCG", "42"), ("TACAGC", "43"), ("TATAAT", "44"), ("TCATTC", "45"),
    ("TCCCGA", "46"), ("TCGAAG", "47"), ("TCGGCA", "48"),
];

/// NEB Dual Index（i7）→ 96 孔板位置
const NEB_DUAL_I7: [(&str, &str); 96] = [
    ("TTACCGAC", "A1"), ("TCGTCTGA", "B1"), ("TTCCAGGT", "C1"), ("TACGGTCT", "D1"),
    ("AAGACCGT", "E1"), ("CAGGTTCA", "F1"), ("TAGGAGCT", "G1"), ("TACTCCAG", "H1"),
    ("AGTGACCT", "A2"), ("AGCCTATC", "B2"), ("TCATCTCC", "C2"), ("CCAGTATC", "D2"),
    ("TTGCGAGA", "E2"), ("GAACGAAG", "F2"), ("CGAATTGC", "G2"), ("GGAAGAGA", "H2"),
    ("TCGGATTC", "A3"), ("CTGTACCA", "B3"), ("GAGAGTAC", "C3"), ("TCTACGCA", "D3"),
    ("GCAATTCC", "E3"), ("CTCAGAAG", "F3"), ("GTCCTAAG", "G3"), ("GCGTTAGA", "H3"),
    ("CAAGGTAC", "A4"), ("AGACCTTG", "B4"), ("GTCGTTAC", "C4"), ("GTAACCGA", "D4"),
    ("GAATCCGT", "E4"), ("CATGAGCA", "F4"), ("CTTAGGAC", "G4"), ("ATCTGACC", "H4"),
    ("TCCTCATG", "A5"), ("AGGATAGC", "B5"), ("GGAGGAAT", "C5"), ("GACGTCAT", "D5"),
    ("CCGCTTAA", "E5"), ("GACGAACT", "F5"), ("TCCACGTT", "G5"), ("AACCAGAG", "H5"),
    ("GTCAGTCA", "A6"), ("CCTTCCAT", "B6"), ("AGGAACAC", "C6"), ("CTTACAGC", "D6"),
    ("TACCTGCA", "E6"), ("AGACGCTA", "F6"), ("CAACACAG", "G6"), ("GTACCACA", "H6"),
    ("CGAATACG", "A7"), ("GTCCTTGA", "B7"), ("CAGTGCTT", "C7"), ("TCCATTGC", "D7"),
    ("GTCGATTG", "E7"), ("ATAACGCC", "F7"), ("GCCTTAAC", "G7"), ("GGTATAGG", "H7"),
    ("TCTAGGAG", "A8"), ("TGCGTAAC", "B8"), ("CTTGCTAG", "C8"), ("AGCGAGAT", "D8"),
    ("TATGGCAC", "E8"), ("GAATCACC", "F8"), ("GTAAGGTG", "G8"), ("CGAGAGAA", "H8"),
    ("CGCAACTA", "A9"), ("CACAGACT", "B9"), ("TGGAAGCA", "C9"), ("CAATAGCC", "D9"),
    ("CTCGAACA", "E9"), ("GGCAAGTT", "F9"), ("AGCTACCA", "G9"), ("CAGCATAC", "H9"),
    ("CGTATCTC", "A10"), ("TTACGTGC", "B10"), ("AGCTAAGC", "C10"), ("AAGACACC", "D10"),
    ("CAACTCCA", "E10"), ("GATCTTGC", "F10"), ("CTTCACTG", "G10"), ("CTCGACTT", "H10"),
    ("GTACACCT", "A11"), ("CCAAGGTT", "B11"), ("GAACGGTT", "C11"), ("CCAGTTGA", "D11"),
    ("GTCATCGT", "E11"), ("CAATGCGA", "F11"), ("GGTTGAAC", "G11"), ("CTTCGGTT", "H11"),
    ("CGGCATTA", "A12"), ("CACGCAAT", "B12"), ("GGAATGTC", "C12"), ("TGGTGAAG", "D12"),
    ("GGACATCA", "E12"), ("GGTGTACA", "F12"), ("GATAGCCA", "G12"), ("CCACAACA", "H12"),
];

fn table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| NEB_SINGLE.iter().chain(NEB_DUAL_I7.iter()).copied().collect())
}

/// 精确匹配查表。
#[inline]
pub fn lookup(barcode: &str) -> Option<&'static str> {
    table().get(barcode).copied()
}

/// 从 header 第一行取出 `key1+key2`：冒号分隔的最后一段，且必须恰好含一个 `+`。
pub fn barcodes_from_header(header: &str) -> Option<(&str, &str)> {
    let line = header.lines().next()?.trim();
    let last = line.rsplit(':').next()?;
    let mut parts = last.split('+');
    let key1 = parts.next()?;
    let key2 = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((key1, key2))
}

/// 按 i7 全长 → 右 key 全长 → 左 key 前 6 nt 的顺序解析 index。
pub fn resolve(key1: &str, key2: &str) -> Option<&'static str> {
    lookup(key1)
        .or_else(|| lookup(key2))
        .or_else(|| key1.get(..SINGLE_INDEX_LEN).and_then(lookup))
}

/// 直接从 header 解析 index。
pub fn resolve_header(header: &str) -> Option<&'static str> {
    let (k1, k2) = barcodes_from_header(header)?;
    resolve(k1, k2)
}
