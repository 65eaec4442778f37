//! Header, vector index and whole-file loaders.
//!
//! The cache policy chosen at open time decides which of these run: the
//! header is always loaded, the vector index for [`CachePolicy::Index`],
//! the whole file for [`CachePolicy::Content`].
//!
//! [`CachePolicy::Index`]: super::CachePolicy::Index
//! [`CachePolicy::Content`]: super::CachePolicy::Content

use std::fs;
use std::path::Path;

use super::format::*;
use super::source::{DataSource, FileSource};
use crate::{Error, Result};

/// In-memory copy of the 512 KiB vector index.
#[derive(Clone)]
pub struct VectorIndex {
    bytes: Box<[u8]>,
}

impl VectorIndex {
    /// Wrap raw vector index bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != VECTOR_INDEX_SIZE {
            return Err(Error::BadHeader(format!(
                "vector index must be {} bytes, got {}",
                VECTOR_INDEX_SIZE,
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Slot covering `ip`.
    pub fn slot(&self, ip: u32) -> VectorSlot {
        let at = (vector_slot_offset(ip) - VECTOR_INDEX_OFFSET) as usize;
        VectorSlot::decode(&self.bytes[at..at + VECTOR_SLOT_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Read and validate the 256-byte header at offset 0.
pub fn load_header(source: &dyn DataSource) -> Result<Header> {
    if source.len() < HEADER_SIZE as u64 {
        return Err(Error::BadHeader(format!(
            "file is {} bytes, shorter than the header",
            source.len()
        )));
    }

    let header = Header::decode(&source.read_vec(0, HEADER_SIZE)?)?;
    header.validate(Some(source.len()))?;
    Ok(header)
}

/// Read the vector index that follows the header.
pub fn load_vector_index(source: &dyn DataSource) -> Result<VectorIndex> {
    VectorIndex::from_bytes(source.read_vec(VECTOR_INDEX_OFFSET, VECTOR_INDEX_SIZE)?)
}

/// Read the whole source into one owned buffer.
pub fn load_content(source: &dyn DataSource) -> Result<Vec<u8>> {
    let len = usize::try_from(source.len())
        .map_err(|_| Error::Config(format!("{} bytes do not fit in memory", source.len())))?;
    source.read_vec(0, len)
}

/// Load and validate the header of the file at `path`.
pub fn load_header_from_file(path: &Path) -> Result<Header> {
    load_header(&FileSource::open(path)?)
}

/// Load the vector index of the file at `path`.
pub fn load_vector_index_from_file(path: &Path) -> Result<VectorIndex> {
    load_vector_index(&FileSource::open(path)?)
}

/// Read the file at `path` into memory.
pub fn load_content_from_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}
