use anyhow::{anyhow, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 按内容（而非扩展名）判断是否为 gzip。
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    let mut f = File::open(path).map_err(|e| anyhow!("cannot open '{}': {}", path.display(), e))?;
    let mut magic = [0u8; 2];
    let mut got = 0;
    while got < 2 {
        let n = f.read(&mut magic[got..])?;
        if n == 0 {
            return Ok(false);
        }
        got += n;
    }
    Ok(magic == GZIP_MAGIC)
}

fn has_gz_ext(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("gz")
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let gz = is_gzipped(path)?;
    let file = File::open(path).map_err(|e| anyhow!("cannot open '{}': {}", path.display(), e))?;
    if gz {
        // 多成员 gzip（pigz / 直接拼接的 .gz）也能完整读出
        Ok(Box::new(BufReader::with_capacity(1 << 20, MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::with_capacity(1 << 20, file)))
    }
}

/// 输出文件：普通文本或 gzip。写完后必须调用 [`Writer::finish`]，
/// gzip 尾部（CRC/长度）在这里写出，错误也在这里返回。
pub enum Writer {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl Writer {
    pub fn finish(self) -> Result<()> {
        match self {
            Writer::Plain(mut w) => w.flush()?,
            Writer::Gzip(w) => {
                let enc = w.into_inner().map_err(|e| e.into_error())?;
                enc.finish()?.flush()?;
            }
        }
        Ok(())
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Writer::Plain(w) => w.write(buf),
            Writer::Gzip(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Writer::Plain(w) => w.write_all(buf),
            Writer::Gzip(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Writer::Plain(w) => w.flush(),
            Writer::Gzip(w) => w.flush(),
        }
    }
}

/// 路径以 `.gz` 结尾时输出 gzip。
pub fn create_writer<P: AsRef<Path>>(path: P) -> Result<Writer> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| anyhow!("cannot create '{}': {}", path.display(), e))?;
    if has_gz_ext(path) {
        let encoder = GzEncoder::new(file, Compression::default());
        Ok(Writer::Gzip(BufWriter::with_capacity(1 << 20, encoder)))
    } else {
        Ok(Writer::Plain(BufWriter::with_capacity(1 << 20, file)))
    }
}
