//! Session read-back and summary
//!
//! Loads a file written by [`FileSink`](super::FileSink) in either layout,
//! or a raw device capture, back into records. Fields are split on commas
//! and trimmed, so the padded `text` layout reads the same as `csv`.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::acquisition::{parse_line, ParseFailure, ParseFailureKind};
use crate::types::{Channel, Record};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed record on line {line_number}: {source}")]
    Malformed {
        line_number: usize,
        source: ParseFailure,
    },
}

/// Read every record of a session file.
///
/// A first line that does not parse is taken as the header. Blank lines are
/// skipped; any other unparseable line is an error, since a session file
/// only ever contains validated records.
pub fn read_session(path: &Path) -> Result<Vec<Record>, ReadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_session(&contents)
}

pub(crate) fn parse_session(contents: &str) -> Result<Vec<Record>, ReadError> {
    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        match parse_line(line) {
            Ok(record) => records.push(record),
            Err(failure) if failure.kind == ParseFailureKind::EmptyLine => {}
            Err(_) if index == 0 => {}
            Err(source) => {
                return Err(ReadError::Malformed {
                    line_number: index + 1,
                    source,
                })
            }
        }
    }
    Ok(records)
}

// ============================================================================
// Summary
// ============================================================================

/// Statistics for one channel. Non-finite samples are excluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub channel: Channel,
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Overview of a recorded session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub records: usize,
    pub first_timestamp_ms: Option<f64>,
    pub last_timestamp_ms: Option<f64>,
    pub channels: Vec<ChannelStats>,
}

impl SessionSummary {
    pub fn from_records(records: &[Record]) -> Self {
        let channels = Channel::ALL
            .iter()
            .map(|&channel| {
                let (samples, min, max, sum) = records
                    .iter()
                    .map(|r| r.channel(channel))
                    .filter(|v| v.is_finite())
                    .fold((0usize, f64::INFINITY, f64::NEG_INFINITY, 0.0), |(n, lo, hi, sum), v| {
                        (n + 1, lo.min(v), hi.max(v), sum + v)
                    });
                if samples == 0 {
                    ChannelStats {
                        channel,
                        samples,
                        min: f64::NAN,
                        max: f64::NAN,
                        mean: f64::NAN,
                    }
                } else {
                    ChannelStats {
                        channel,
                        samples,
                        min,
                        max,
                        mean: sum / samples as f64,
                    }
                }
            })
            .collect();

        Self {
            records: records.len(),
            first_timestamp_ms: records.first().map(|r| r.timestamp_ms),
            last_timestamp_ms: records.last().map(|r| r.timestamp_ms),
            channels,
        }
    }

    /// Device time between the first and last record (ms).
    pub fn duration_ms(&self) -> f64 {
        match (self.first_timestamp_ms, self.last_timestamp_ms) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn channel(&self, channel: Channel) -> Option<&ChannelStats> {
        self.channels.iter().find(|s| s.channel == channel)
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:  {}", self.records)?;
        writeln!(f, "Duration: {:.1} s", self.duration_ms() / 1000.0)?;
        writeln!(f, "{:<12} {:>12} {:>12} {:>12}", "Channel", "Min", "Max", "Mean")?;
        for stats in &self.channels {
            writeln!(
                f,
                "{:<12} {:>12.3} {:>12.3} {:>12.3}",
                stats.channel.name(),
                stats.min,
                stats.max,
                stats.mean
            )?;
        }
        Ok(())
    }
}
