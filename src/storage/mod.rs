//! Session Persistence
//!
//! Every valid record of a recording session is appended to durable storage,
//! independent of what the live window has already evicted.
//!
//! - [`PersistenceSink`]: the trait the pipeline driver writes through
//! - [`FileSink`]: buffered file writer in `csv` or aligned `text` layout
//! - [`InMemorySink`]: for tests and embedding callers
//! - [`reader`]: loads a session file back and summarises it

pub mod reader;
mod sink;

pub use reader::{read_session, ChannelStats, ReadError, SessionSummary};
pub use sink::{FileSink, InMemorySink};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::types::Record;

// ============================================================================
// Errors
// ============================================================================

/// Persistence errors. Any of these ends the current recording session.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Refusing to overwrite existing session file {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Sink is closed")]
    Closed,
}

// ============================================================================
// Sink Trait
// ============================================================================

/// Destination for every record of a recording session.
///
/// The driver calls [`write`](PersistenceSink::write) once per valid record,
/// [`flush`](PersistenceSink::flush) at the end of each ingestion tick and
/// [`close`](PersistenceSink::close) when the session stops. Writes after
/// close fail with [`SinkError::Closed`].
pub trait PersistenceSink: Send {
    fn write(&mut self, record: &Record) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;

    /// Flush and release the underlying handle. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), SinkError>;

    fn records_written(&self) -> u64;

    /// Human-readable destination for logging.
    fn describe(&self) -> String;
}

// ============================================================================
// Formats and Targets
// ============================================================================

/// On-disk session layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    /// Comma-separated values, one record per line
    #[default]
    Csv,
    /// Column-aligned text for reading in an editor
    Text,
}

impl SinkFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            SinkFormat::Csv => "csv",
            SinkFormat::Text => "txt",
        }
    }

    /// Guess the layout from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("txt") => SinkFormat::Text,
            _ => SinkFormat::Csv,
        }
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkFormat::Csv => write!(f, "csv"),
            SinkFormat::Text => write!(f, "text"),
        }
    }
}

impl FromStr for SinkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(SinkFormat::Csv),
            "text" | "txt" => Ok(SinkFormat::Text),
            other => Err(format!("unknown sink format '{other}' (expected csv or text)")),
        }
    }
}

/// Where and how a recording session is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub path: PathBuf,
    pub format: SinkFormat,
    pub overwrite: bool,
}

impl SessionTarget {
    pub fn new(path: impl Into<PathBuf>, format: SinkFormat) -> Self {
        Self {
            path: path.into(),
            format,
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.<ext>` using local time.
    pub fn timestamped(dir: &Path, prefix: &str, format: SinkFormat) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Self::new(
            dir.join(format!("{prefix}_{stamp}.{}", format.extension())),
            format,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_and_display() {
        assert_eq!("CSV".parse::<SinkFormat>().unwrap(), SinkFormat::Csv);
        assert_eq!("txt".parse::<SinkFormat>().unwrap(), SinkFormat::Text);
        assert!("xml".parse::<SinkFormat>().is_err());
        assert_eq!(SinkFormat::Text.to_string(), "text");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SinkFormat::from_path(Path::new("a/b.TXT")), SinkFormat::Text);
        assert_eq!(SinkFormat::from_path(Path::new("a/b.csv")), SinkFormat::Csv);
        assert_eq!(SinkFormat::from_path(Path::new("a/b")), SinkFormat::Csv);
    }

    #[test]
    fn test_timestamped_target() {
        let target = SessionTarget::timestamped(Path::new("/tmp/out"), "pmmg", SinkFormat::Text);
        let name = target.path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("pmmg_"));
        assert!(name.ends_with(".txt"));
        // pmmg_ + YYYYmmdd_HHMMSS + .txt
        assert_eq!(name.len(), 5 + 15 + 4);
        assert_eq!(target.path.parent(), Some(Path::new("/tmp/out")));
        assert!(!target.overwrite);
    }
}
