//! Driver State and Pipeline Statistics

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::acquisition::ParseFailureKind;

// ============================================================================
// Driver State
// ============================================================================

/// Lifecycle of the pipeline driver.
///
/// ```text
/// Idle --connect--> Connected --start_recording--> Recording
///   ^                 |   ^                            |
///   +---disconnect----+   +-------stop_recording-------+
///
/// any --shutdown--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// No device attached
    Idle,
    /// Device attached, not recording
    Connected,
    /// Ingesting and persisting records
    Recording,
    /// Terminal; no further transitions
    Closed,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Idle => write!(f, "Idle"),
            DriverState::Connected => write!(f, "Connected"),
            DriverState::Recording => write!(f, "Recording"),
            DriverState::Closed => write!(f, "Closed"),
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Ingestion counters, kept per session and for the driver's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub bytes_received: u64,
    pub lines_received: u64,
    /// Records written to the sink and appended to the window
    pub records_accepted: u64,
    pub empty_lines: u64,
    pub field_count_errors: u64,
    pub numeric_errors: u64,
    /// Bytes dropped because a partial line outgrew the fragment limit
    pub fragment_bytes_dropped: u64,
}

impl PipelineStats {
    /// Lines discarded for any reason other than being blank.
    pub fn malformed_lines(&self) -> u64 {
        self.field_count_errors + self.numeric_errors
    }

    pub(crate) fn count_failure(&mut self, kind: ParseFailureKind) {
        match kind {
            ParseFailureKind::EmptyLine => self.empty_lines += 1,
            ParseFailureKind::FieldCount { .. } => self.field_count_errors += 1,
            ParseFailureKind::NumericConversion { .. } => self.numeric_errors += 1,
        }
    }
}

impl std::ops::AddAssign for PipelineStats {
    fn add_assign(&mut self, other: Self) {
        self.bytes_received += other.bytes_received;
        self.lines_received += other.lines_received;
        self.records_accepted += other.records_accepted;
        self.empty_lines += other.empty_lines;
        self.field_count_errors += other.field_count_errors;
        self.numeric_errors += other.numeric_errors;
        self.fragment_bytes_dropped += other.fragment_bytes_dropped;
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bytes, {} lines, {} records, {} malformed, {} empty",
            self.bytes_received,
            self.lines_received,
            self.records_accepted,
            self.malformed_lines(),
            self.empty_lines
        )
    }
}

/// Outcome of one ingestion tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub bytes: usize,
    pub lines: usize,
    pub records: usize,
    pub rejected: usize,
}

/// Summary of a finished recording session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Sink description (file path and format)
    pub destination: String,
    pub records_written: u64,
    pub stats: PipelineStats,
    /// Wall-clock length of the session
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Set when the session ended because the sink failed
    pub sink_error: Option<String>,
}

impl std::fmt::Display for SessionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} records in {:.1}s ({})",
            self.destination,
            self.records_written,
            self.elapsed.as_secs_f64(),
            self.stats
        )?;
        if let Some(ref e) = self.sink_error {
            write!(f, " [sink failed: {e}]")?;
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_state_display() {
        assert_eq!(format!("{}", DriverState::Idle), "Idle");
        assert_eq!(format!("{}", DriverState::Recording), "Recording");
        assert_eq!(format!("{}", DriverState::Closed), "Closed");
    }

    #[test]
    fn test_stats_accumulate() {
        let mut total = PipelineStats::default();
        let mut tick = PipelineStats {
            bytes_received: 10,
            lines_received: 2,
            ..Default::default()
        };
        tick.count_failure(ParseFailureKind::FieldCount { found: 3 });
        tick.count_failure(ParseFailureKind::EmptyLine);

        total += tick;
        total += tick;
        assert_eq!(total.bytes_received, 20);
        assert_eq!(total.malformed_lines(), 2);
        assert_eq!(total.empty_lines, 2);
    }

    #[test]
    fn test_session_report_serializes_elapsed_seconds() {
        let report = SessionReport {
            destination: "in-memory".to_string(),
            records_written: 3,
            stats: PipelineStats::default(),
            elapsed: Duration::from_millis(1500),
            sink_error: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed"], 1.5);
        assert!(report.to_string().starts_with("in-memory: 3 records in 1.5s"));
    }
}
