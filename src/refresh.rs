//! Atomic download-and-swap of the database file.
//!
//! A refresh streams the remote file into `<path>.savetmp`, validates its
//! header, runs the before-save hooks, renames the temp file over `<path>`
//! and runs the after-save hooks. The rename is the commit point: before it
//! the old file is untouched, after it the new file is live. The temp file
//! is removed on every exit path.
//!
//! # Example
//!
//! ```ignore
//! use ipregion::refresh::Refresher;
//! use ipregion::CancelToken;
//! use std::path::Path;
//!
//! Refresher::new("https://example.com/ip2region.xdb", Path::new("/tmp/ip2region.xdb"))
//!     .on_progress(|p| println!("{}/{}", p.current, p.total))
//!     .before_save(|| Ok(()))
//!     .after_save(|| Ok(()))
//!     .run(&CancelToken::new())?;
//! ```

use flate2::read::GzDecoder;
use std::cell::Cell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::xdb::{loader, Header};
use crate::{CancelToken, Error, Result};

/// Suffix of the staging file next to the destination.
pub const TEMP_SUFFIX: &str = ".savetmp";

/// Read buffer size; cancellation is checked once per chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// Minimum spacing between intermediate progress reports.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Download progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Bytes received so far.
    pub current: u64,
    /// Expected bytes from `Content-Length`, or 0 when unknown.
    pub total: u64,
    /// Bytes per second since the previous report.
    pub speed: u64,
    /// Time since the request was sent.
    pub elapsed: Duration,
    /// Set on the final report only.
    pub completed: bool,
}

impl Progress {
    /// Percentage received, when the total is known.
    pub fn percent(&self) -> Option<f64> {
        (self.total > 0).then(|| self.current as f64 * 100.0 / self.total as f64)
    }

    /// Bytes per second over the whole download.
    pub fn average_speed(&self) -> u64 {
        rate(self.current, self.elapsed)
    }
}

/// Shareable progress callback.
pub type ProgressHook = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Hook run around the rename.
pub type SaveHook<'a> = Box<dyn FnMut() -> Result<()> + 'a>;

/// Progress hook that logs through the `log` facade.
pub fn log_progress(p: &Progress) {
    if p.completed {
        log::info!(
            "Database downloaded: {} in {:.2?}, average {}/s",
            human_bytes(p.current),
            p.elapsed,
            human_bytes(p.average_speed())
        );
        return;
    }

    match p.percent() {
        Some(percent) => log::info!(
            "Downloading database: {:6.2}% {:>19} {:>11}/s",
            percent,
            format!("{}/{}", human_bytes(p.current), human_bytes(p.total)),
            human_bytes(p.speed)
        ),
        None => log::info!(
            "Downloading database: {:>9} {:>11}/s",
            human_bytes(p.current),
            human_bytes(p.speed)
        ),
    }
}

/// Render a byte count with binary units, e.g. `1.50MiB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    for (i, unit) in UNITS.iter().enumerate().rev() {
        let scale = 1u64 << ((i + 1) * 10);
        if bytes >= scale {
            return format!("{:.2}{}", bytes as f64 / scale as f64, unit);
        }
    }
    format!("{}B", bytes)
}

fn rate(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Sibling staging path: `<dest>.savetmp`.
pub fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Downloads the database and swaps it into place.
pub struct Refresher<'a> {
    url: String,
    dest: PathBuf,
    agent: ureq::Agent,
    progress: Option<Box<dyn FnMut(&Progress) + 'a>>,
    before_save: Vec<SaveHook<'a>>,
    after_save: Vec<SaveHook<'a>>,
}

impl<'a> Refresher<'a> {
    /// Refresh `dest` from `url`.
    pub fn new(url: &str, dest: &Path) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(60))
            .build();

        Self {
            url: url.to_string(),
            dest: dest.to_path_buf(),
            agent,
            progress: None,
            before_save: Vec::new(),
            after_save: Vec::new(),
        }
    }

    /// Use a preconfigured HTTP agent (proxy, TLS, timeouts).
    pub fn with_agent(mut self, agent: ureq::Agent) -> Self {
        self.agent = agent;
        self
    }

    /// Report progress on the first chunk, at most once per second after
    /// that, and once on completion.
    pub fn on_progress(mut self, hook: impl FnMut(&Progress) + 'a) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    /// Run `hook` after the download succeeds, before the rename.
    pub fn before_save(mut self, hook: impl FnMut() -> Result<()> + 'a) -> Self {
        self.before_save.push(Box::new(hook));
        self
    }

    /// Run `hook` after the rename.
    pub fn after_save(mut self, hook: impl FnMut() -> Result<()> + 'a) -> Self {
        self.after_save.push(Box::new(hook));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Download, validate and commit in one go.
    pub fn run(self, cancel: &CancelToken) -> Result<()> {
        self.fetch(cancel)?.commit()
    }

    /// Download into the staging file and validate it, without touching
    /// the destination.
    pub fn fetch(mut self, cancel: &CancelToken) -> Result<Staged<'a>> {
        cancel.check()?;

        if let Some(parent) = self.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        log::info!("Downloading {} to {:?}", self.url, self.dest);
        let started = Instant::now();
        let response = self.agent.get(&self.url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => Error::HttpStatus(code),
            ureq::Error::Transport(t) => Error::Transport(t.to_string()),
        })?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(Error::HttpStatus(status));
        }

        let total = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);

        let temp = TempFile::create(temp_path(&self.dest))?;
        let received = Rc::new(Cell::new(0u64));
        let mut counted = BufReader::new(CountingReader {
            inner: response.into_reader(),
            count: Rc::clone(&received),
        });
        let compressed = is_gzip(
            counted
                .fill_buf()
                .map_err(|e| Error::Transport(e.to_string()))?,
        );
        let mut body: Box<dyn Read> = if compressed {
            log::debug!("Response body is gzip compressed");
            Box::new(GzDecoder::new(counted))
        } else {
            Box::new(counted)
        };

        let mut tracker = Tracker::new(self.progress.as_deref_mut(), total, started);
        let size = copy_body(&mut body, &temp, cancel, || tracker.update(received.get()))?;
        tracker.finish(received.get());
        drop(body);

        let header = loader::load_header_from_file(&temp.path)?;
        log::debug!(
            "Staged {:?}: {} bytes, {} segments",
            temp.path,
            size,
            header.segment_count()
        );

        Ok(Staged {
            temp,
            dest: self.dest,
            size,
            header,
            before_save: self.before_save,
            after_save: self.after_save,
        })
    }
}

/// Check if data starts with the gzip magic.
fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Copy the body into the staging file, checking `cancel` per chunk.
fn copy_body(
    body: &mut dyn Read,
    temp: &TempFile,
    cancel: &CancelToken,
    mut on_chunk: impl FnMut(),
) -> Result<u64> {
    let mut file = temp.open()?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        cancel.check()?;
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Transport(e.to_string())),
        };
        file.write_all(&buf[..n])
            .map_err(|e| Error::io(&temp.path, e))?;
        written += n as u64;
        on_chunk();
    }

    file.sync_all().map_err(|e| Error::io(&temp.path, e))?;
    Ok(written)
}

/// A validated download waiting to be swapped in.
pub struct Staged<'a> {
    temp: TempFile,
    dest: PathBuf,
    size: u64,
    header: Header,
    before_save: Vec<SaveHook<'a>>,
    after_save: Vec<SaveHook<'a>>,
}

impl<'a> Staged<'a> {
    /// Header of the downloaded file.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Size of the downloaded file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp.path
    }

    pub fn before_save(mut self, hook: impl FnMut() -> Result<()> + 'a) -> Self {
        self.before_save.push(Box::new(hook));
        self
    }

    pub fn after_save(mut self, hook: impl FnMut() -> Result<()> + 'a) -> Self {
        self.after_save.push(Box::new(hook));
        self
    }

    /// Run before-save hooks, rename over the destination, run after-save
    /// hooks. Stops at the first error; the rename is not rolled back.
    pub fn commit(mut self) -> Result<()> {
        if let Ok(meta) = fs::symlink_metadata(&self.dest) {
            if !meta.is_file() && !meta.file_type().is_symlink() {
                return Err(Error::Config(format!(
                    "{:?} is not a regular file, can not overwrite",
                    self.dest
                )));
            }
        }

        for hook in &mut self.before_save {
            hook()?;
        }

        fs::rename(&self.temp.path, &self.dest).map_err(|e| Error::io(&self.dest, e))?;
        log::info!("Database saved to {:?} ({} bytes)", self.dest, self.size);

        for hook in &mut self.after_save {
            hook()?;
        }
        Ok(())
    }
}

/// Staging file, removed on drop if it still exists.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn create(path: PathBuf) -> Result<Self> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        Ok(Self { path })
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed staging file {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove staging file {:?}: {}", self.path, e),
        }
    }
}

/// Counts bytes as they come off the network, before decompression.
struct CountingReader<R> {
    inner: R,
    count: Rc<Cell<u64>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }
}

/// Throttles progress reports.
struct Tracker<'h, 'a> {
    hook: Option<&'h mut (dyn FnMut(&Progress) + 'a)>,
    total: u64,
    started: Instant,
    last_at: Instant,
    last_bytes: u64,
    reported: bool,
}

impl<'h, 'a> Tracker<'h, 'a> {
    fn new(hook: Option<&'h mut (dyn FnMut(&Progress) + 'a)>, total: u64, started: Instant) -> Self {
        Self {
            hook,
            total,
            started,
            last_at: started,
            last_bytes: 0,
            reported: false,
        }
    }

    fn update(&mut self, current: u64) {
        if self.hook.is_some() {
            self.update_at(current, Instant::now());
        }
    }

    /// Report the first chunk, then at most once per [`REPORT_INTERVAL`].
    fn update_at(&mut self, current: u64, now: Instant) {
        if !self.reported || now.duration_since(self.last_at) >= REPORT_INTERVAL {
            self.reported = true;
            self.emit(current, now, false);
        }
    }

    fn finish(&mut self, current: u64) {
        self.finish_at(current, Instant::now());
    }

    fn finish_at(&mut self, current: u64, now: Instant) {
        self.emit(current, now, true);
    }

    fn emit(&mut self, current: u64, now: Instant, completed: bool) {
        let Some(hook) = self.hook.as_mut() else {
            return;
        };

        let progress = Progress {
            current,
            total: if completed && self.total == 0 {
                current
            } else {
                self.total
            },
            speed: rate(current - self.last_bytes, now.duration_since(self.last_at)),
            elapsed: now.duration_since(self.started),
            completed,
        };
        hook(&progress);

        self.last_at = now;
        self.last_bytes = current;
    }
}
