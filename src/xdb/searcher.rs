//! Two-phase xdb lookup: vector slot, then binary search over segments.

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;

use super::format::*;
use super::loader::{self, VectorIndex};
use super::source::{BufferSource, DataSource, FileSource};
use crate::ip::parse_ip;
use crate::{CancelToken, Error, Result};

/// How much of the database is held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Nothing cached; every lookup reads the vector slot and segments from disk.
    #[default]
    File,
    /// The 512 KiB vector index is cached; segments are read from disk.
    Index,
    /// The whole file is cached; lookups do no I/O.
    Content,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::File => "file",
            CachePolicy::Index => "index",
            CachePolicy::Content => "content",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CachePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(CachePolicy::File),
            "index" => Ok(CachePolicy::Index),
            "content" => Ok(CachePolicy::Content),
            _ => Err(Error::Config(format!("unknown cache policy `{}`", s))),
        }
    }
}

/// Read-only xdb searcher.
///
/// All lookups take `&self`. Memory-resident searchers are lock-free;
/// file-backed ones serialise their reads on the file handle.
///
/// # Example
///
/// ```ignore
/// use ipregion::xdb::{CachePolicy, Searcher};
/// use std::path::Path;
///
/// let searcher = Searcher::open(Path::new("ip2region.xdb"), CachePolicy::Index)?;
/// let region = searcher.search_str("8.8.8.8")?;
/// assert_eq!(region, "美国|0|加利福尼亚|山景城|Google");
/// ```
pub struct Searcher {
    header: Header,
    source: Box<dyn DataSource>,
    vector: Option<VectorIndex>,
}

impl Searcher {
    /// Open `path` with the preloads `policy` calls for.
    pub fn open(path: &Path, policy: CachePolicy) -> Result<Self> {
        let searcher = match policy {
            CachePolicy::File => Self::with_file_only(path)?,
            CachePolicy::Index => {
                let vector = loader::load_vector_index_from_file(path)?;
                Self::with_vector_index(path, vector)?
            }
            CachePolicy::Content => Self::with_buffer(loader::load_content_from_file(path)?)?,
        };

        log::debug!(
            "Opened {:?} with {} cache: {} segments",
            path,
            policy,
            searcher.header.segment_count()
        );
        Ok(searcher)
    }

    /// Searcher that reads everything from the file.
    pub fn with_file_only(path: &Path) -> Result<Self> {
        Self::with_source(Box::new(FileSource::open(path)?), None)
    }

    /// Searcher with a preloaded vector index; segments are read from the file.
    pub fn with_vector_index(path: &Path, vector: VectorIndex) -> Result<Self> {
        Self::with_source(Box::new(FileSource::open(path)?), Some(vector))
    }

    /// Searcher over a complete in-memory copy of the file.
    pub fn with_buffer(content: Vec<u8>) -> Result<Self> {
        Self::with_source(Box::new(BufferSource::new(content)), None)
    }

    /// Searcher over a read-only memory mapping of the file.
    pub fn with_mmap(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        // The mapping is read-only and the file is replaced by rename, never
        // rewritten in place.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))?;
        Self::with_source(Box::new(BufferSource::new(mmap)), None)
    }

    /// Searcher over any data source, validating its header.
    pub fn with_source(source: Box<dyn DataSource>, vector: Option<VectorIndex>) -> Result<Self> {
        let header = loader::load_header(source.as_ref())?;
        Ok(Self {
            header,
            source,
            vector,
        })
    }

    /// The validated file header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Whether lookups are served without file I/O.
    pub fn is_resident(&self) -> bool {
        self.source.is_resident()
    }

    /// Look up the raw region string for `ip`.
    pub fn search(&self, ip: u32) -> Result<String> {
        self.lookup(ip, None)
    }

    /// Look up the raw region string for `ip`, honouring `cancel` before
    /// each file read.
    pub fn search_with(&self, ip: u32, cancel: &CancelToken) -> Result<String> {
        cancel.check()?;
        self.lookup(ip, Some(cancel))
    }

    /// Parse a dotted quad and look it up.
    pub fn search_str(&self, ip: &str) -> Result<String> {
        self.search(parse_ip(ip)?)
    }

    /// Find the segment record covering `ip`.
    pub fn segment(&self, ip: u32) -> Result<Segment> {
        self.find_segment(ip, None)
    }

    fn lookup(&self, ip: u32, cancel: Option<&CancelToken>) -> Result<String> {
        let segment = self.find_segment(ip, cancel)?;
        self.poll(cancel)?;
        self.read_region(&segment)
    }

    fn find_segment(&self, ip: u32, cancel: Option<&CancelToken>) -> Result<Segment> {
        let slot = match &self.vector {
            Some(vector) => vector.slot(ip),
            None => {
                let mut buf = [0u8; VECTOR_SLOT_SIZE];
                self.source.read_at(vector_slot_offset(ip), &mut buf)?;
                VectorSlot::decode(&buf)
            }
        };

        if slot.is_empty() {
            return Err(Error::NotFound(ip.into()));
        }
        self.check_slot(ip, &slot)?;

        let base = u64::from(slot.first_ptr);
        let mut lo = 0u64;
        let mut hi = (u64::from(slot.last_ptr) - base) / SEGMENT_SIZE as u64;
        let mut buf = [0u8; SEGMENT_SIZE];

        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            self.poll(cancel)?;
            self.source
                .read_at(base + mid * SEGMENT_SIZE as u64, &mut buf)?;
            let segment = Segment::decode(&buf);

            if ip < segment.start_ip {
                if mid == 0 {
                    break;
                }
                hi = mid - 1;
            } else if ip > segment.end_ip {
                lo = mid + 1;
            } else {
                return Ok(segment);
            }
        }

        Err(Error::NotFound(ip.into()))
    }

    /// The slot must address whole records inside the segment index.
    fn check_slot(&self, ip: u32, slot: &VectorSlot) -> Result<()> {
        let start = self.header.start_index_ptr;
        let end = self.header.end_index_ptr;
        let in_bounds = start <= slot.first_ptr
            && slot.first_ptr <= slot.last_ptr
            && slot.last_ptr <= end
            && (slot.first_ptr - start) as usize % SEGMENT_SIZE == 0
            && (slot.last_ptr - slot.first_ptr) as usize % SEGMENT_SIZE == 0;

        if in_bounds {
            Ok(())
        } else {
            Err(Error::BadRecord(format!(
                "vector slot for {} points at [{}, {}], outside segment index [{}, {}]",
                std::net::Ipv4Addr::from(ip),
                slot.first_ptr,
                slot.last_ptr,
                start,
                end
            )))
        }
    }

    fn read_region(&self, segment: &Segment) -> Result<String> {
        if segment.region_len == 0 {
            return Err(Error::BadRecord(format!(
                "empty region for segment starting at {}",
                std::net::Ipv4Addr::from(segment.start_ip)
            )));
        }

        let ptr = u64::from(segment.region_ptr);
        let len = usize::from(segment.region_len);
        if ptr + len as u64 > self.source.len() {
            return Err(Error::BadRecord(format!(
                "region at {} (+{}) runs past end of data ({})",
                ptr,
                len,
                self.source.len()
            )));
        }

        let bytes = self.source.read_vec(ptr, len)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::BadRecord(format!("region at {} is not UTF-8: {}", ptr, e)))
    }

    /// Cancellation only matters where a read can block.
    fn poll(&self, cancel: Option<&CancelToken>) -> Result<()> {
        match cancel {
            Some(token) if !self.source.is_resident() => token.check(),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Searcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Searcher")
            .field("header", &self.header)
            .field("len", &self.source.len())
            .field("resident", &self.source.is_resident())
            .field("vector_cached", &self.vector.is_some())
            .finish()
    }
}
