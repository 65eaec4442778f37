//! Provider facade: open, search, update and close one xdb database.
//!
//! [`XdbProvider`] owns a [`Searcher`] behind a read-write lock. Searches
//! share the read lock; an update downloads and validates the new file
//! while searches keep running against the old one, then holds the write
//! lock for the close, rename and re-open steps. Searches issued in that
//! window block until the new searcher is in place.
//!
//! # Example
//!
//! ```ignore
//! use ipregion::{CachePolicy, CancelToken, OpenOptions, XdbProvider};
//! use std::path::Path;
//!
//! let cancel = CancelToken::new();
//! let provider = XdbProvider::open(
//!     Path::new("/var/lib/ipregion/ip2region.xdb"),
//!     OpenOptions::default().with_cache(CachePolicy::Content),
//!     &cancel,
//! )?;
//!
//! let region = provider.search("8.8.8.8", &[], &cancel)?;
//! println!("{}", region);
//! ```

mod region;

pub use region::{parse_region, Name, Region, REGION_FIELDS};

use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::ip::parse_ip;
use crate::metadata::{meta_path, UpdateMetadata};
use crate::refresh::{log_progress, Progress, ProgressHook, Refresher};
use crate::xdb::{CachePolicy, Header, Searcher};
use crate::{CancelToken, Error, Result};

/// Where the database is downloaded from unless configured otherwise.
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://raw.gitmirror.com/adysec/IP_database/main/ip2region/ip2region.xdb";

/// Lookup backend surface shared by geolocation providers.
pub trait GeoProvider: Send + Sync {
    /// Look up `ip`. `langs` selects result languages on backends that
    /// store several; single-locale backends ignore it.
    fn search(&self, ip: &str, langs: &[&str], cancel: &CancelToken) -> Result<Region>;

    /// Replace the database with a fresh download.
    fn update(&self, cancel: &CancelToken) -> Result<()>;

    /// Release the database. Later searches and updates fail with
    /// [`Error::Closed`].
    fn close(&self) -> Result<()>;
}

/// Options for [`XdbProvider::open`].
#[derive(Clone)]
pub struct OpenOptions {
    pub cache: CachePolicy,
    pub download_url: String,
    pub progress: Option<ProgressHook>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            cache: CachePolicy::default(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            progress: Some(Arc::new(log_progress)),
        }
    }
}

impl OpenOptions {
    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    pub fn with_progress(mut self, hook: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(hook));
        self
    }

    /// Download silently.
    pub fn without_progress(mut self) -> Self {
        self.progress = None;
        self
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("cache", &self.cache)
            .field("download_url", &self.download_url)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// The xdb-backed provider.
pub struct XdbProvider {
    path: PathBuf,
    options: OpenOptions,
    /// `None` once closed.
    searcher: RwLock<Option<Searcher>>,
    updating: Mutex<()>,
}

impl XdbProvider {
    /// Open the database at `path`, downloading it first if it is missing.
    pub fn open(path: &Path, options: OpenOptions, cancel: &CancelToken) -> Result<Self> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(Error::Config(format!(
                    "{:?} exists but is not a regular file",
                    path
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!(
                    "Database {:?} not found, downloading from {}",
                    path,
                    options.download_url
                );
                let staged = refresher(path, &options).fetch(cancel)?;
                let size = staged.size();
                staged.commit()?;
                record_update(path, &options.download_url, size);
            }
            Err(e) => return Err(Error::io(path, e)),
        }

        let searcher = Searcher::open(path, options.cache)?;
        log::info!(
            "Opened {:?} ({} cache, {} segments)",
            path,
            options.cache,
            searcher.header().segment_count()
        );

        Ok(Self {
            path: path.to_path_buf(),
            options,
            searcher: RwLock::new(Some(searcher)),
            updating: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.options.cache
    }

    pub fn download_url(&self) -> &str {
        &self.options.download_url
    }

    pub fn is_closed(&self) -> bool {
        self.searcher.read().is_none()
    }

    /// Header of the open database.
    pub fn header(&self) -> Result<Header> {
        let guard = self.searcher.read();
        let searcher = guard.as_ref().ok_or(Error::Closed)?;
        Ok(*searcher.header())
    }

    /// Look up `ip` and return the raw region string.
    pub fn search_raw(&self, ip: &str, cancel: &CancelToken) -> Result<String> {
        let guard = self.searcher.read();
        let searcher = guard.as_ref().ok_or(Error::Closed)?;
        searcher.search_with(parse_ip(ip)?, cancel)
    }

    /// Look up `ip`. `langs` is accepted for [`GeoProvider`] compatibility
    /// and ignored: xdb files carry a single locale.
    pub fn search(&self, ip: &str, _langs: &[&str], cancel: &CancelToken) -> Result<Region> {
        let guard = self.searcher.read();
        let searcher = guard.as_ref().ok_or(Error::Closed)?;
        let ip = parse_ip(ip)?;
        let raw = searcher.search_with(ip, cancel)?;
        parse_region(ip, &raw)
    }

    /// Download a fresh copy and swap it in.
    ///
    /// A failure before the rename leaves the old file and searcher serving.
    /// A failure after it (re-open of the new file) leaves the provider
    /// closed.
    pub fn update(&self, cancel: &CancelToken) -> Result<()> {
        let _updating = self.updating.lock();
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let staged = refresher(&self.path, &self.options).fetch(cancel)?;
        let size = staged.size();

        let mut guard = self.searcher.write();
        let slot = RefCell::new(&mut *guard);
        staged
            .before_save(|| match slot.borrow_mut().take() {
                Some(_) => Ok(()),
                None => Err(Error::Closed),
            })
            .after_save(|| {
                let searcher = Searcher::open(&self.path, self.options.cache)?;
                **slot.borrow_mut() = Some(searcher);
                Ok(())
            })
            .commit()?;
        drop(guard);

        log::info!("Reloaded {:?} after update", self.path);
        record_update(&self.path, &self.options.download_url, size);
        Ok(())
    }

    /// When the last update through this crate finished, if recorded.
    pub fn last_updated(&self) -> Result<Option<SystemTime>> {
        Ok(UpdateMetadata::load(&meta_path(&self.path))?.last_updated)
    }

    /// Whether `interval` has passed since the last recorded update.
    /// Unreadable metadata counts as stale.
    pub fn needs_update(&self, interval: Duration) -> bool {
        match UpdateMetadata::load(&meta_path(&self.path)) {
            Ok(meta) => meta.needs_update(interval),
            Err(e) => {
                log::warn!("Ignoring update metadata for {:?}: {}", self.path, e);
                true
            }
        }
    }

    /// Update if `interval` has passed. Returns whether an update ran.
    pub fn update_if_needed(&self, interval: Duration, cancel: &CancelToken) -> Result<bool> {
        if !self.needs_update(interval) {
            log::debug!("Database {:?} is fresh, skipping update", self.path);
            return Ok(false);
        }
        self.update(cancel)?;
        Ok(true)
    }

    /// Drop the searcher and its file handles. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.searcher.write().take().is_some() {
            log::debug!("Closed {:?}", self.path);
        }
        Ok(())
    }
}

impl GeoProvider for XdbProvider {
    fn search(&self, ip: &str, langs: &[&str], cancel: &CancelToken) -> Result<Region> {
        XdbProvider::search(self, ip, langs, cancel)
    }

    fn update(&self, cancel: &CancelToken) -> Result<()> {
        XdbProvider::update(self, cancel)
    }

    fn close(&self) -> Result<()> {
        XdbProvider::close(self)
    }
}

impl fmt::Debug for XdbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XdbProvider")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn refresher<'a>(path: &Path, options: &OpenOptions) -> Refresher<'a> {
    let refresher = Refresher::new(&options.download_url, path);
    match options.progress.clone() {
        Some(hook) => refresher.on_progress(move |p| hook(p)),
        None => refresher,
    }
}

/// Metadata is advisory; a failed write is logged, not returned.
fn record_update(path: &Path, url: &str, size: u64) {
    let meta = meta_path(path);
    if let Err(e) = UpdateMetadata::fetched(url, size).save(&meta) {
        log::warn!("Failed to write update metadata {:?}: {}", meta, e);
    }
}
