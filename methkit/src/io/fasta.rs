use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

pub struct FastaReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    peek_header: Option<String>,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            done: false,
            peek_header: None,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done {
            return Ok(None);
        }

        // Find header line
        let header = if let Some(h) = self.peek_header.take() {
            h
        } else {
            loop {
                self.buf.clear();
                let n = self.reader.read_line(&mut self.buf)?;
                if n == 0 {
                    self.done = true;
                    return Ok(None);
                }
                if self.buf.starts_with('>') {
                    let h = self.buf[1..].trim().to_string();
                    break h;
                }
            }
        };

        let (id, desc) = split_header(&header);

        // Read sequence lines
        let mut seq: Vec<u8> = Vec::new();
        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf)?;
            if n == 0 {
                self.done = true;
                break;
            }
            if self.buf.starts_with('>') {
                let h = self.buf[1..].trim().to_string();
                self.peek_header = Some(h);
                break;
            }
            for &b in self.buf.as_bytes() {
                match b {
                    b'\n' | b'\r' | b' ' | b'\t' => {}
                    _ => seq.push(b.to_ascii_uppercase()),
                }
            }
        }

        Ok(Some(FastaRecord { id, desc, seq }))
    }
}

fn split_header(header: &str) -> (String, Option<String>) {
    let mut parts = header.splitn(2, char::is_whitespace);
    let id = parts.next().unwrap_or("").to_string();
    let desc = parts
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    (id, desc)
}

/// `.fai` 中的一行：与 samtools faidx 的五列格式一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaiEntry {
    pub name: String,
    /// 序列碱基数
    pub length: u64,
    /// 第一个碱基在文件中的字节偏移
    pub offset: u64,
    /// 每行碱基数
    pub line_bases: u64,
    /// 每行字节数（含换行符）
    pub line_width: u64,
}

impl FaiEntry {
    /// 第 `pos` 个碱基（0-based）所在的文件字节偏移。
    #[inline]
    fn byte_offset(&self, pos: u64) -> u64 {
        if self.line_bases == 0 {
            return self.offset;
        }
        self.offset + (pos / self.line_bases) * self.line_width + pos % self.line_bases
    }
}

/// FASTA 随机访问索引。保留文件中的序列顺序，名称查找走哈希表。
#[derive(Debug, Clone, Default)]
pub struct FaiIndex {
    entries: Vec<FaiEntry>,
    by_name: HashMap<String, usize>,
}

impl FaiIndex {
    pub fn from_entries(entries: Vec<FaiEntry>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            if by_name.insert(e.name.clone(), i).is_some() {
                bail!("duplicate sequence name '{}' in FASTA index", e.name);
            }
        }
        Ok(Self { entries, by_name })
    }

    /// 扫描未压缩的 FASTA，记录每条序列的布局。
    /// 同一条序列内除最后一行外每行长度必须一致。
    pub fn build<P: AsRef<Path>>(fasta: P) -> Result<Self> {
        let fasta = fasta.as_ref();
        let fh = File::open(fasta)
            .map_err(|e| anyhow!("cannot open reference FASTA '{}': {}", fasta.display(), e))?;
        let mut reader = BufReader::new(fh);

        let mut entries: Vec<FaiEntry> = Vec::new();
        let mut cur: Option<FaiEntry> = None;
        // 遇到短行（或空行）后本序列不应再出现碱基行
        let mut seen_short = false;
        let mut pos: u64 = 0;
        let mut line_no = 0usize;
        let mut buf: Vec<u8> = Vec::new();

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            line_no += 1;
            let width = n as u64;

            if buf[0] == b'>' {
                if let Some(done) = cur.take() {
                    entries.push(done);
                }
                let header = String::from_utf8_lossy(&buf[1..]);
                let (name, _) = split_header(header.trim());
                if name.is_empty() {
                    bail!("{}:{}: empty sequence name", fasta.display(), line_no);
                }
                cur = Some(FaiEntry { name, length: 0, offset: pos + width, line_bases: 0, line_width: 0 });
                seen_short = false;
                pos += width;
                continue;
            }

            let bases = buf
                .iter()
                .take_while(|&&b| b != b'\n' && b != b'\r')
                .count() as u64;
            let Some(entry) = cur.as_mut() else {
                if bases == 0 {
                    pos += width;
                    continue;
                }
                bail!("{}:{}: sequence data before first header", fasta.display(), line_no);
            };

            if bases == 0 {
                seen_short = true;
            } else if entry.line_bases == 0 {
                entry.line_bases = bases;
                entry.line_width = width;
            } else {
                if seen_short || bases > entry.line_bases {
                    bail!(
                        "{}:{}: inconsistent line length in sequence '{}'",
                        fasta.display(),
                        line_no,
                        entry.name
                    );
                }
                if bases < entry.line_bases {
                    seen_short = true;
                } else if width != entry.line_width && buf.last() == Some(&b'\n') {
                    bail!(
                        "{}:{}: inconsistent line ending in sequence '{}'",
                        fasta.display(),
                        line_no,
                        entry.name
                    );
                }
            }
            entry.length += bases;
            pos += width;
        }
        if let Some(done) = cur.take() {
            entries.push(done);
        }
        Self::from_entries(entries)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fh = File::open(path).map_err(|e| anyhow!("cannot open FASTA index '{}': {}", path.display(), e))?;
        let mut entries = Vec::new();
        for (i, line) in BufReader::new(fh).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 5 {
                bail!("{}:{}: expected 5 columns, found {}", path.display(), i + 1, cols.len());
            }
            let num = |s: &str| -> Result<u64> {
                s.trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow!("{}:{}: bad number '{}': {}", path.display(), i + 1, s, e))
            };
            entries.push(FaiEntry {
                name: cols[0].to_string(),
                length: num(cols[1])?,
                offset: num(cols[2])?,
                line_bases: num(cols[3])?,
                line_width: num(cols[4])?,
            });
        }
        Self::from_entries(entries)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let fh = File::create(path).map_err(|e| anyhow!("cannot write FASTA index '{}': {}", path.display(), e))?;
        let mut w = BufWriter::new(fh);
        for e in &self.entries {
            writeln!(w, "{}\t{}\t{}\t{}\t{}", e.name, e.length, e.offset, e.line_bases, e.line_width)?;
        }
        w.flush()?;
        Ok(())
    }

    /// 优先读取同目录下的 `<fasta>.fai`，不存在时现场构建（不落盘）。
    pub fn load_or_build<P: AsRef<Path>>(fasta: P) -> Result<Self> {
        let fai = fai_path(fasta.as_ref());
        if fai.is_file() {
            Self::read(&fai)
        } else {
            log::debug!("no index at {}, scanning FASTA", fai.display());
            Self::build(fasta)
        }
    }

    pub fn get(&self, name: &str) -> Option<&FaiEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[FaiEntry] {
        &self.entries
    }

    pub fn sequence_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn fai_path(fasta: &Path) -> PathBuf {
    let mut s = fasta.as_os_str().to_os_string();
    s.push(".fai");
    PathBuf::from(s)
}

#[derive(Debug)]
pub enum FetchError {
    UnknownSequence(String),
    InvalidRange { start: i64, end: i64 },
    Io(std::io::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::UnknownSequence(name) => write!(f, "sequence '{}' not present in FASTA index", name),
            FetchError::InvalidRange { start, end } => write!(f, "invalid fetch range {}..{}", start, end),
            FetchError::Io(e) => write!(f, "FASTA read failed: {}", e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Io(e)
    }
}

/// 带索引的参考序列：按染色体名 + 坐标随机读取。
pub struct IndexedFasta {
    file: File,
    index: FaiIndex,
    buf: Vec<u8>,
}

impl IndexedFasta {
    pub fn open<P: AsRef<Path>>(fasta: P) -> Result<Self> {
        let index = FaiIndex::load_or_build(fasta.as_ref())?;
        Self::with_index(fasta, index)
    }

    pub fn with_index<P: AsRef<Path>>(fasta: P, index: FaiIndex) -> Result<Self> {
        let path = fasta.as_ref();
        let file = File::open(path)
            .map_err(|e| anyhow!("cannot open reference FASTA '{}': {}", path.display(), e))?;
        Ok(Self { file, index, buf: Vec::new() })
    }

    pub fn index(&self) -> &FaiIndex {
        &self.index
    }

    pub fn sequence_names(&self) -> Vec<&str> {
        self.index.sequence_names()
    }

    /// 读取 `[start, end)`（0-based，半开区间），保留文件中的大小写（soft-mask）。
    /// `end` 超出序列长度时截断；`start < 0` 或 `start > end` 为非法区间。
    pub fn fetch(&mut self, chrom: &str, start: i64, end: i64) -> Result<Vec<u8>, FetchError> {
        let entry = self
            .index
            .get(chrom)
            .ok_or_else(|| FetchError::UnknownSequence(chrom.to_string()))?;
        if start < 0 || start > end {
            return Err(FetchError::InvalidRange { start, end });
        }
        let start = (start as u64).min(entry.length);
        let end = (end as u64).min(entry.length);
        if start == end {
            return Ok(Vec::new());
        }

        let from = entry.byte_offset(start);
        let to = entry.byte_offset(end - 1) + 1;
        self.buf.resize((to - from) as usize, 0);
        self.file.seek(SeekFrom::Start(from))?;
        self.file.read_exact(&mut self.buf)?;

        let mut seq = Vec::with_capacity((end - start) as usize);
        for &b in &self.buf {
            match b {
                b'\n' | b'\r' => {}
                _ => seq.push(b),
            }
        }
        Ok(seq)
    }
}
