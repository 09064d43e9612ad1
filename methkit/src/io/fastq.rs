use anyhow::{anyhow, Result};
use std::io::BufRead;
use std::path::Path;

use super::xopen;

#[derive(Debug, Clone)]
pub struct FastqRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

/// 四行一条记录的 FASTQ 读取器（不支持折行序列）。
pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    /// 已读行数，用于报错定位
    line_no: usize,
    done: bool,
}

impl FastqReader<Box<dyn BufRead + Send>> {
    /// 打开文件，gzip 按内容自动识别。
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(xopen::open_reader(path)?))
    }
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), line_no: 0, done: false }
    }

    /// 读一行到 `buf`，返回去掉行尾后的内容；EOF 返回 `None`。
    fn read_line(&mut self) -> Result<Option<&str>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(self.buf.trim_end_matches(['\n', '\r'])))
    }

    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        if self.done {
            return Ok(None);
        }

        let header = match self.read_line()? {
            None => {
                self.done = true;
                return Ok(None);
            }
            Some(h) => h.to_string(),
        };
        let header = header
            .strip_prefix('@')
            .ok_or_else(|| anyhow!("line {}: FASTQ header not starting with '@'", self.line_no))?;
        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let seq = match self.read_line()? {
            Some(l) => l.as_bytes().to_vec(),
            None => return Err(anyhow!("record '{}': unexpected EOF after header", id)),
        };
        match self.read_line()? {
            Some(l) if l.starts_with('+') => {}
            _ => return Err(anyhow!("record '{}': missing '+' line", id)),
        }
        let qual = match self.read_line()? {
            Some(l) => l.as_bytes().to_vec(),
            None => return Err(anyhow!("record '{}': missing quality line", id)),
        };
        if qual.len() != seq.len() {
            return Err(anyhow!("record '{}': {} bases but {} quality values", id, seq.len(), qual.len()));
        }

        Ok(Some(FastqRecord { id, desc, seq, qual }))
    }
}

/// 读取 FASTQ（可为 gzip）的第一行，去掉行尾换行；空文件返回 `None`。
pub fn first_header<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
    let mut reader = xopen::open_reader(path)?;
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end().to_string()))
}
