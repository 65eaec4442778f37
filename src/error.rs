//! Error types for ipregion.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for ipregion operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input is not a dotted-quad IPv4 address
    #[error("invalid IPv4 address: {0:?}")]
    InvalidIp(String),

    /// Address is valid but no segment covers it
    #[error("no region found for {0}")]
    NotFound(Ipv4Addr),

    /// Positional read from a data source failed
    #[error("read of {len} bytes at offset {offset} failed: {source}")]
    Read {
        offset: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },

    /// File system operation failed
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File header violates the xdb layout
    #[error("bad xdb header: {0}")]
    BadHeader(String),

    /// Segment or region string failed structural validation
    #[error("bad xdb record: {0}")]
    BadRecord(String),

    /// Operation attempted on a closed handle
    #[error("database is closed")]
    Closed,

    /// Download answered with a non-2xx status
    #[error("download failed with HTTP status {0}")]
    HttpStatus(u16),

    /// Download failed below the HTTP layer
    #[error("transport error: {0}")]
    Transport(String),

    /// Caller aborted via cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Attach a path to an I/O error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Structural errors (bad header, bad record, invalid input) reproduce
    /// on every call; I/O and transport failures may not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Read { .. } | Error::Io { .. } | Error::Transport(_) | Error::HttpStatus(_)
        )
    }
}

/// Result type alias for ipregion operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_displays_dotted_quad() {
        let err = Error::NotFound(Ipv4Addr::from(0x01000100));
        assert_eq!(err.to_string(), "no region found for 1.0.1.0");
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = Error::io(
            "/var/lib/ip2region.xdb",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().starts_with("/var/lib/ip2region.xdb"));
    }

    #[test]
    fn test_transient_kinds() {
        let read = Error::Read {
            offset: 256,
            len: 8,
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
        };
        assert!(read.is_transient());
        assert!(Error::Transport("reset".into()).is_transient());
        assert!(!Error::BadHeader("version".into()).is_transient());
        assert!(!Error::BadRecord("len".into()).is_transient());
        assert!(!Error::NotFound(Ipv4Addr::UNSPECIFIED).is_transient());
        assert!(!Error::Closed.is_transient());
    }
}
