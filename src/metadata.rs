//! `<db>.meta` sidecar recording the last successful refresh.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::{Error, Result};

/// Suffix appended to the database path.
pub const META_SUFFIX: &str = ".meta";

/// Sidecar path for the database at `db`.
pub fn meta_path(db: &Path) -> PathBuf {
    let mut name = db.as_os_str().to_owned();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

/// What the last refresh fetched and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateMetadata {
    #[serde(with = "unix_secs", default)]
    pub last_updated: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

mod unix_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(time: &Option<SystemTime>, s: S) -> Result<S::Ok, S::Error> {
        time.map(|t| t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs())
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SystemTime>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(|s| UNIX_EPOCH + Duration::from_secs(s)))
    }
}

impl UpdateMetadata {
    /// Record a refresh from `url` of `size` bytes, now.
    pub fn fetched(url: &str, size: u64) -> Self {
        Self {
            last_updated: Some(SystemTime::now()),
            url: Some(url.to_string()),
            size: Some(size),
        }
    }

    /// Load the sidecar; a missing file yields the empty record.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::io(path, e)),
        };
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid metadata in {:?}: {}", path, e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| Error::io(path, e))
    }

    /// True when nothing is recorded or `interval` has passed since the
    /// last refresh. A timestamp in the future counts as stale.
    pub fn needs_update(&self, interval: Duration) -> bool {
        match self.last_updated {
            None => true,
            Some(last) => SystemTime::now()
                .duration_since(last)
                .map(|elapsed| elapsed >= interval)
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_meta_path() {
        assert_eq!(
            meta_path(Path::new("/data/ip2region.xdb")),
            PathBuf::from("/data/ip2region.xdb.meta")
        );
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip2region.xdb.meta");
        let meta = UpdateMetadata::fetched("https://example.com/ip2region.xdb", 11_042_429);
        meta.save(&path).unwrap();

        let loaded = UpdateMetadata::load(&path).unwrap();
        assert_eq!(loaded.url.as_deref(), Some("https://example.com/ip2region.xdb"));
        assert_eq!(loaded.size, Some(11_042_429));
        assert!(loaded.last_updated.is_some());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let loaded = UpdateMetadata::load(&dir.path().join("absent.meta")).unwrap();
        assert_eq!(loaded, UpdateMetadata::default());
        assert!(loaded.needs_update(Duration::from_secs(3600)));
    }

    #[test]
    fn test_garbage_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.meta");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(UpdateMetadata::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_reads_bare_timestamp() {
        let meta: UpdateMetadata = serde_json::from_str(r#"{"last_updated": 1700000000}"#).unwrap();
        assert_eq!(
            meta.last_updated,
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
        assert_eq!(meta.url, None);
    }

    #[test]
    fn test_needs_update() {
        let meta = UpdateMetadata {
            last_updated: Some(SystemTime::now() - Duration::from_secs(3600)),
            ..Default::default()
        };
        assert!(meta.needs_update(Duration::from_secs(1800)));
        assert!(!meta.needs_update(Duration::from_secs(7200)));

        let future = UpdateMetadata {
            last_updated: Some(SystemTime::now() + Duration::from_secs(3600)),
            ..Default::default()
        };
        assert!(future.needs_update(Duration::from_secs(7200)));
    }
}
