//! Byte-addressable data sources.
//!
//! The searcher reads everything through [`DataSource`] and does not know
//! whether the bytes come from a file handle or from memory.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Fixed-length reads at absolute offsets.
pub trait DataSource: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Short reads are errors: either the whole buffer is filled or the call
    /// fails with [`Error::Read`].
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether reads touch only memory.
    fn is_resident(&self) -> bool {
        false
    }

    /// Read `len` bytes at `offset` into a new buffer.
    fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    fn read_u16_le(&self, offset: u64) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_at(offset, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32_le(&self, offset: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_at(offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// File-backed source.
///
/// Seek and read happen under one lock, so concurrent callers never
/// observe each other's cursor position. They may block on each other.
pub struct FileSource {
    file: Mutex<File>,
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Open a file for positional reads.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let len = file.metadata().map_err(|e| Error::io(path, e))?.len();
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            len,
        })
    }

    /// Path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let read_err = |source: std::io::Error| Error::Read {
            offset,
            len,
            source,
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset)).map_err(read_err)?;
        file.read_exact(buf).map_err(read_err)
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// Source over a contiguous in-memory region: an owned buffer or a mapping.
pub struct BufferSource<B> {
    bytes: B,
}

impl<B: AsRef<[u8]>> BufferSource<B> {
    pub fn new(bytes: B) -> Self {
        Self { bytes }
    }

    /// The whole underlying region.
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    /// Borrow `len` bytes at `offset` without copying.
    pub fn slice(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let bytes = self.bytes.as_ref();
        usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
            .and_then(|range| bytes.get(range))
            .ok_or_else(|| Error::Read {
                offset,
                len,
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("range exceeds buffer of {} bytes", bytes.len()),
                ),
            })
    }
}

impl<B: AsRef<[u8]> + Send + Sync> DataSource for BufferSource<B> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.slice(offset, buf.len())?);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.bytes.as_ref().len() as u64
    }

    fn is_resident(&self) -> bool {
        true
    }
}
