//! Process-wide data directory.
//!
//! The directory is resolved lazily on first use. Embedding applications
//! that want a different location call [`set_data_dir`] before opening
//! anything; library entry points take explicit paths and never consult
//! this value on their own.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::env;
use std::path::{Path, PathBuf};

/// Global data directory
static DATA_DIR: Lazy<RwLock<PathBuf>> = Lazy::new(|| RwLock::new(default_data_dir()));

/// Override the process-wide data directory.
pub fn set_data_dir(path: impl Into<PathBuf>) {
    let path = path.into();
    log::debug!("Data directory set to {:?}", path);
    *DATA_DIR.write() = path;
}

/// Get the process-wide data directory.
pub fn data_dir() -> PathBuf {
    DATA_DIR.read().clone()
}

/// Resolve a file name inside the data directory.
///
/// # Examples
/// ```
/// use ipregion::{data_file, set_data_dir};
///
/// set_data_dir("/srv/geo");
/// assert_eq!(data_file("ip2region.xdb"), std::path::Path::new("/srv/geo/ip2region.xdb"));
/// ```
pub fn data_file(name: impl AsRef<Path>) -> PathBuf {
    DATA_DIR.read().join(name)
}

/// Platform data home joined with the executable's base name.
///
/// The data home is `$XDG_DATA_HOME` (or `~/.local/share`) on Linux,
/// `~/Library/Application Support` on macOS and `%LOCALAPPDATA%` on Windows.
fn default_data_dir() -> PathBuf {
    let exe_name = env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let home = dirs::data_local_dir().unwrap_or_else(|| {
        log::warn!("No data directory for this platform, using the temp directory");
        env::temp_dir()
    });
    home.join(trim_exe_suffix(&exe_name, cfg!(windows)))
}

/// Strip a trailing `.exe`, case-insensitively, when `windows` is set.
fn trim_exe_suffix(name: &str, windows: bool) -> &str {
    const SUFFIX: &str = ".exe";
    if windows && name.len() >= SUFFIX.len() {
        let split = name.len() - SUFFIX.len();
        if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(SUFFIX) {
            return &name[..split];
        }
    }
    name
}
