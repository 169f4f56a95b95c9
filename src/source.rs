//! Scoped byte-range reads over large resources.
//!
//! A [`ByteRangeSource`] never hands out the whole resource. Every read goes
//! through [`ByteRangeSource::open_range`], which returns a reader yielding
//! exactly the requested bytes. Any handle it holds is released when that
//! reader is dropped.
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type RangeReader<'a> = Box<dyn Read + Send + 'a>;

pub trait ByteRangeSource: Send + Sync {
    /// Total length of the resource in bytes.
    fn size(&self) -> u64;

    /// Open an independent read session over `[start, start + len)`.
    fn open_range(&self, start: u64, len: u64) -> io::Result<RangeReader<'_>>;
}

pub type SharedSource = Arc<dyn ByteRangeSource>;

impl<T: ByteRangeSource + ?Sized> ByteRangeSource for Arc<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }
    fn open_range(&self, start: u64, len: u64) -> io::Result<RangeReader<'_>> {
        (**self).open_range(start, len)
    }
}

fn check_range(size: u64, start: u64, len: u64) -> io::Result<()> {
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("range {}+{} past end of source ({} bytes)", start, len, size),
        )),
    }
}

/// A file on disk. Each range opens its own handle.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        Ok(FileSource { path, size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteRangeSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn open_range(&self, start: u64, len: u64) -> io::Result<RangeReader<'_>> {
        check_range(self.size, start, len)?;
        let mut f = File::open(&self.path)?;
        f.seek(SeekFrom::Start(start))?;
        log::trace!("open {} range {}+{}", self.path.display(), start, len);
        Ok(Box::new(f.take(len)))
    }
}

/// An in-memory buffer shared between readers.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        MemorySource { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteRangeSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn open_range(&self, start: u64, len: u64) -> io::Result<RangeReader<'_>> {
        check_range(self.size(), start, len)?;
        // Bounds were checked against a slice length, so both fit in usize.
        let slice = &self.data[start as usize..(start + len) as usize];
        Ok(Box::new(Cursor::new(slice)))
    }
}

/// Read a whole range into memory.
pub fn read_range(src: &dyn ByteRangeSource, start: u64, len: u64) -> io::Result<Vec<u8>> {
    let mut r = src.open_range(start, len)?;
    let mut buf = Vec::with_capacity(len.min(1 << 20) as usize);
    r.read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read: wanted {} bytes, got {}", len, buf.len()),
        ));
    }
    Ok(buf)
}
