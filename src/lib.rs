//! ipregion - IPv4 to region/ISP lookups over ip2region xdb files.
//!
//! This crate reads the xdb binary format: a fixed header, a vector index
//! keyed by the top two octets of an address, and a sorted table of segment
//! records pointing into a pool of `country|region|province|city|isp`
//! strings. A lookup is one vector slot read plus a short binary search.
//!
//! # Features
//!
//! - **Three cache policies**: read everything from disk, cache the vector
//!   index, or hold the whole file in memory
//! - **Memory-mapped searcher**: serve lookups straight from an `mmap`
//! - **Thread-safe**: all lookups take `&self`; file-backed reads are
//!   serialised on the file handle
//! - **Atomic refresh**: download to a sibling temp file, validate, rename
//!   over the old file, re-open
//! - **Cancellation**: lookups and downloads honour a [`CancelToken`]
//!
//! # Quick Start
//!
//! ```ignore
//! use ipregion::{CachePolicy, CancelToken, OpenOptions, XdbProvider};
//! use std::path::Path;
//!
//! let cancel = CancelToken::new();
//!
//! // Downloads the database first if the file is missing
//! let provider = XdbProvider::open(
//!     Path::new("/var/lib/ipregion/ip2region.xdb"),
//!     OpenOptions::default().with_cache(CachePolicy::Index),
//!     &cancel,
//! )?;
//!
//! let region = provider.search("1.0.0.1", &[], &cancel)?;
//! assert_eq!(region.country.name, "中国");
//!
//! // Refresh in place; concurrent searches keep working
//! provider.update(&cancel)?;
//! ```
//!
//! # Low-level Search
//!
//! The [`Searcher`] works on raw region strings and numeric addresses:
//!
//! ```ignore
//! use ipregion::{CachePolicy, Searcher};
//! use std::path::Path;
//!
//! let searcher = Searcher::open(Path::new("ip2region.xdb"), CachePolicy::Content)?;
//! let raw = searcher.search(0x08080808)?;
//! assert_eq!(raw, "美国|0|加利福尼亚|山景城|Google");
//! ```

mod cancel;
mod error;
mod global;
mod metadata;

pub mod ip;
pub mod provider;
pub mod refresh;
pub mod xdb;

// Re-export core types
pub use cancel::CancelToken;
pub use error::{Error, Result};

// Re-export the provider facade
pub use provider::{
    parse_region, GeoProvider, Name, OpenOptions, Region, XdbProvider, DEFAULT_DOWNLOAD_URL,
};

// Re-export searcher types
pub use xdb::{CachePolicy, Header, Searcher};

// Re-export refresh types
pub use refresh::{Progress, ProgressHook, Refresher};

// Re-export data directory configuration
pub use global::{data_dir, data_file, set_data_dir};

// Re-export metadata
pub use metadata::{meta_path, UpdateMetadata};
