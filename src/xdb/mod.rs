//! The xdb on-disk format and its searcher.
//!
//! An xdb file is a header, a fixed-size vector index keyed by the top two
//! octets of an address, a pool of region strings and a sorted table of
//! 14-byte segment records. A lookup costs one vector slot read plus a
//! binary search over the handful of segments the slot points at.
//!
//! # File Structure
//!
//! ```text
//! +--------------------+
//! |      HEADER        |  256 bytes (fixed)
//! +--------------------+
//! |   VECTOR INDEX     |  256 x 256 x 8 bytes = 512 KiB
//! +--------------------+
//! |   REGION POOL      |  variable, UTF-8 "country|region|province|city|isp"
//! +--------------------+
//! |   SEGMENT INDEX    |  n x 14 bytes, sorted by start ip
//! +--------------------+
//! ```
//!
//! All integers are little-endian.

mod format;
pub mod loader;
mod searcher;
pub mod source;

#[cfg(test)]
pub(crate) mod fixture;


pub use format::*;
pub use loader::{load_content, load_header, load_vector_index, VectorIndex};
pub use searcher::{CachePolicy, Searcher};
pub use source::{BufferSource, DataSource, FileSource};
