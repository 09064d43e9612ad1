//! 参考序列目录的命名约定：多个参考合并后的名称、header → 文件名映射。

use anyhow::Result;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use crate::io::xopen;
use crate::util::fs;

/// `["lambda", "pUC19", "5mC164"]` → `"5mC164_lambda_pUC19"`
pub fn mkrefs<S: AsRef<str>>(refs: &[S]) -> String {
    let mut names: Vec<&str> = refs.iter().map(AsRef::as_ref).collect();
    names.sort_unstable();
    names.join("_")
}

pub fn split_refs(refs: &str) -> Vec<String> {
    refs.split('_').map(str::to_string).collect()
}

/// FASTA 中所有 header 的首个字段，保持文件顺序。只读 header 行，不载入序列。
pub fn chromosomes(fasta: &Path) -> Result<Vec<String>> {
    let reader = xopen::open_reader(fasta)?;
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(h) = line.strip_prefix('>') {
            out.push(h.split_whitespace().next().unwrap_or("").to_string());
        }
    }
    Ok(out)
}

/// 目录下每个 `*.fa` 的 header → 文件名（不含扩展名）。
pub fn fasta_map(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for f in fs::list_files(dir, |name| name.ends_with(".fa"))? {
        let stem = f.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
        for chrom in chromosomes(&f)? {
            out.insert(chrom, stem.clone());
        }
    }
    Ok(out)
}

/// [`fasta_map`] 的反向：文件名 → header 列表。
pub fn refs_by_fasta(map: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (chrom, file) in map {
        out.entry(file.clone()).or_default().push(chrom.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_split() {
        assert_eq!(mkrefs(&["lambda", "pUC19", "5mC164"]), "5mC164_lambda_pUC19");
        assert_eq!(split_refs("5mC164_lambda_pUC19"), vec!["5mC164", "lambda", "pUC19"]);
    }

    #[test]
    fn header_map() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lambda.fa"), ">J02459.1 lambda\nACGT\n").unwrap();
        std::fs::write(dir.path().join("mix.fa"), ">pUC19\nAC\n>5mC164 spike\nGG\n").unwrap();
        std::fs::write(dir.path().join("skip.fasta"), ">nope\nA\n").unwrap();

        assert_eq!(chromosomes(&dir.path().join("mix.fa")).unwrap(), vec!["pUC19", "5mC164"]);

        let m = fasta_map(dir.path()).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m["J02459.1"], "lambda");
        assert_eq!(m["5mC164"], "mix");

        let rev = refs_by_fasta(&m);
        assert_eq!(rev["mix"], vec!["5mC164", "pUC19"]);
    }
}
