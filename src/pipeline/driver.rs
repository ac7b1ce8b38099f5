//! Pipeline Driver - synchronous core of the recorder
//!
//! Owns the line assembler, the live window and (while recording) the
//! persistence sink. Every valid record goes to the sink first and then to
//! the window, so a record is never stored in only one of them.
//!
//! The driver does no I/O scheduling of its own: the async
//! [`PipelineRunner`](super::PipelineRunner) calls [`ingest`] and
//! [`render_snapshot`] from one task, which keeps ticks non-overlapping.
//!
//! [`ingest`]: PipelineDriver::ingest
//! [`render_snapshot`]: PipelineDriver::render_snapshot

use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::state::{DriverState, PipelineStats, SessionReport, TickReport};
use crate::acquisition::{parse_line, LineAssembler, ParseFailure, ParseFailureKind, SourceError};
use crate::buffer::{Snapshot, WindowedBuffer};
use crate::config::StreamConfig;
use crate::storage::{PersistenceSink, SinkError};
use crate::types::ChannelSet;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: DriverState, action: &'static str },

    #[error("Not recording (state: {0})")]
    NotRecording(DriverState),

    #[error("Persistence failed, session ended: {0}")]
    Sink(#[from] SinkError),

    #[error("Byte source failed: {0}")]
    Source(#[from] SourceError),
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Receives every line the parser rejected. Never fatal.
pub trait DiagnosticSink: Send {
    fn rejected(&mut self, failure: &ParseFailure);
}

/// Reports rejected lines through `tracing`: blank lines at debug, malformed
/// lines at warn with their raw content.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn rejected(&mut self, failure: &ParseFailure) {
        match failure.kind {
            ParseFailureKind::EmptyLine => debug!("Skipping empty line"),
            ParseFailureKind::FieldCount { found } => {
                warn!(found, line = %failure.raw_line, "Invalid data format, discarding line");
            }
            ParseFailureKind::NumericConversion { field } => {
                warn!(field, line = %failure.raw_line, "Data conversion error, discarding line");
            }
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

struct ActiveSession {
    sink: Box<dyn PersistenceSink>,
    stats: PipelineStats,
    started: Instant,
}

pub struct PipelineDriver {
    state: DriverState,
    assembler: LineAssembler,
    buffer: WindowedBuffer,
    session: Option<ActiveSession>,
    diagnostics: Box<dyn DiagnosticSink>,
    totals: PipelineStats,
    sessions_completed: u64,
    /// Report of a session ended by a sink failure, until collected
    aborted: Option<SessionReport>,
}

impl PipelineDriver {
    pub fn new(horizon_ms: f64) -> Self {
        Self::with_parts(WindowedBuffer::new(horizon_ms), LineAssembler::new())
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::with_parts(
            WindowedBuffer::new(config.window.horizon_ms),
            LineAssembler::with_max_fragment(config.source.max_fragment_bytes),
        )
    }

    fn with_parts(buffer: WindowedBuffer, assembler: LineAssembler) -> Self {
        Self {
            state: DriverState::Idle,
            assembler,
            buffer,
            session: None,
            diagnostics: Box::new(TracingDiagnostics),
            totals: PipelineStats::default(),
            sessions_completed: 0,
            aborted: None,
        }
    }

    /// Replace the default tracing diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == DriverState::Recording
    }

    /// Read-only view of the live window.
    pub fn buffer(&self) -> &WindowedBuffer {
        &self.buffer
    }

    /// Counters across every session since construction.
    pub fn totals(&self) -> PipelineStats {
        let mut totals = self.totals;
        if let Some(ref session) = self.session {
            totals += session.stats;
        }
        totals
    }

    /// Counters for the session in progress.
    pub fn session_stats(&self) -> Option<PipelineStats> {
        self.session.as_ref().map(|s| s.stats)
    }

    pub fn sessions_completed(&self) -> u64 {
        self.sessions_completed
    }

    /// Report of the last session a sink failure ended, if not yet taken.
    pub fn take_aborted_report(&mut self) -> Option<SessionReport> {
        self.aborted.take()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// The byte source has been acquired.
    pub fn connect(&mut self) -> Result<(), DriverError> {
        self.require(DriverState::Idle, "connect")?;
        self.state = DriverState::Connected;
        info!("Device connected");
        Ok(())
    }

    /// Release the device, ending any session first.
    pub fn disconnect(&mut self) -> Result<Option<SessionReport>, DriverError> {
        let report = match self.state {
            DriverState::Recording => Some(self.stop_recording()?),
            DriverState::Connected => None,
            state => return Err(DriverError::InvalidTransition { state, action: "disconnect" }),
        };
        self.state = DriverState::Idle;
        info!("Device disconnected");
        Ok(report)
    }

    /// Begin a session writing to `sink`.
    ///
    /// The live window and any partial line from before the session are
    /// discarded so the session starts on a clean line boundary.
    pub fn start_recording(&mut self, sink: Box<dyn PersistenceSink>) -> Result<(), DriverError> {
        self.require(DriverState::Connected, "start recording")?;

        self.buffer.clear();
        self.assembler.reset();
        info!(destination = %sink.describe(), "🔴 Recording started");

        self.session = Some(ActiveSession {
            sink,
            stats: PipelineStats::default(),
            started: Instant::now(),
        });
        self.state = DriverState::Recording;
        Ok(())
    }

    /// Close the sink and stop ingesting. The window is kept for inspection.
    ///
    /// The driver is back in `Connected` even when closing the sink fails.
    pub fn stop_recording(&mut self) -> Result<SessionReport, DriverError> {
        self.require(DriverState::Recording, "stop recording")?;

        let (report, close_result) = self.end_session(None);
        info!("⏹ Recording stopped: {}", report);
        close_result?;
        Ok(report)
    }

    /// Close any open session and enter the terminal state. Idempotent; the
    /// driver is `Closed` even if closing the sink fails.
    pub fn shutdown(&mut self) -> Result<Option<SessionReport>, DriverError> {
        let (report, close_result) = match self.state {
            DriverState::Closed => return Ok(None),
            DriverState::Recording => {
                let (report, close_result) = self.end_session(None);
                info!("⏹ Recording stopped: {}", report);
                (Some(report), close_result)
            }
            DriverState::Idle | DriverState::Connected => (None, Ok(())),
        };
        self.state = DriverState::Closed;
        info!(totals = %self.totals, "Pipeline driver closed");
        close_result.map(|()| report)
    }

    // ========================================================================
    // Ticks
    // ========================================================================

    /// Process one batch of raw bytes.
    ///
    /// Rejected lines go to the diagnostic sink and do not stop the batch. A
    /// sink failure aborts the rest of the batch, ends the session and is
    /// returned; the driver is then `Connected` and can start a new session.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<TickReport, DriverError> {
        if self.state != DriverState::Recording {
            return Err(DriverError::NotRecording(self.state));
        }

        let mut tick = TickReport {
            bytes: bytes.len(),
            ..TickReport::default()
        };
        let mut delta = PipelineStats {
            bytes_received: bytes.len() as u64,
            ..PipelineStats::default()
        };

        let discarded_before = self.assembler.discarded_bytes();
        let lines = self.assembler.feed(bytes);
        delta.fragment_bytes_dropped = self.assembler.discarded_bytes() - discarded_before;

        let mut failure: Option<SinkError> = None;
        if let Some(session) = self.session.as_mut() {
            for line in lines {
                tick.lines += 1;
                delta.lines_received += 1;
                debug!(line = %line, "Received line");

                match parse_line(&line) {
                    Ok(record) => {
                        if let Err(e) = session.sink.write(&record) {
                            failure = Some(e);
                            break;
                        }
                        self.buffer.append(&record);
                        tick.records += 1;
                        delta.records_accepted += 1;
                    }
                    Err(rejected) => {
                        tick.rejected += 1;
                        delta.count_failure(rejected.kind);
                        self.diagnostics.rejected(&rejected);
                    }
                }
            }

            if failure.is_none() {
                failure = session.sink.flush().err();
            }
            session.stats += delta;
        }

        if let Some(e) = failure {
            error!(error = %e, "Session file write failed, ending recording");
            let (report, _) = self.end_session(Some(e.to_string()));
            warn!("Session ended early: {}", report);
            self.aborted = Some(report);
            return Err(DriverError::Sink(e));
        }

        Ok(tick)
    }

    /// Copy of the live window restricted to `channels`, or `None` while the
    /// window is empty.
    pub fn render_snapshot(&self, channels: &ChannelSet) -> Option<Snapshot> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.snapshot(channels))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn require(&self, expected: DriverState, action: &'static str) -> Result<(), DriverError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DriverError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }

    /// Close and drop the session sink, returning to `Connected`.
    fn end_session(&mut self, sink_error: Option<String>) -> (SessionReport, Result<(), DriverError>) {
        self.state = DriverState::Connected;

        let Some(mut session) = self.session.take() else {
            let report = SessionReport {
                destination: String::new(),
                records_written: 0,
                stats: PipelineStats::default(),
                elapsed: std::time::Duration::ZERO,
                sink_error,
            };
            return (report, Ok(()));
        };

        let close_result = session.sink.close().map_err(DriverError::Sink);
        if let Err(ref e) = close_result {
            warn!(error = %e, "Failed to close session sink");
        }

        self.totals += session.stats;
        self.sessions_completed += 1;

        let report = SessionReport {
            destination: session.sink.describe(),
            records_written: session.sink.records_written(),
            stats: session.stats,
            elapsed: session.started.elapsed(),
            sink_error,
        };
        (report, close_result)
    }
}

impl Default for PipelineDriver {
    fn default() -> Self {
        Self::new(crate::config::defaults::HORIZON_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemorySink;
    use crate::types::Channel;
    use std::sync::{Arc, Mutex};

    const LINE_A: &[u8] = b"12.0,1,1,1,1,1,1,1,1,0,0\n";
    const LINE_B: &[u8] = b"34.0,2,2,2,2,2,2,2,2,0,0\n";

    fn recording_driver() -> (PipelineDriver, InMemorySink) {
        let mut driver = PipelineDriver::default();
        let sink = InMemorySink::new();
        driver.connect().unwrap();
        driver.start_recording(Box::new(sink.clone())).unwrap();
        (driver, sink)
    }

    #[derive(Clone, Default)]
    struct Collected(Arc<Mutex<Vec<ParseFailureKind>>>);

    impl DiagnosticSink for Collected {
        fn rejected(&mut self, failure: &ParseFailure) {
            self.0.lock().unwrap().push(failure.kind);
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut driver = PipelineDriver::default();
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(matches!(
            driver.start_recording(Box::new(InMemorySink::new())),
            Err(DriverError::InvalidTransition { state: DriverState::Idle, .. })
        ));

        driver.connect().unwrap();
        assert!(driver.connect().is_err());
        driver.start_recording(Box::new(InMemorySink::new())).unwrap();
        assert!(driver.is_recording());

        let report = driver.stop_recording().unwrap();
        assert_eq!(report.records_written, 0);
        assert_eq!(driver.state(), DriverState::Connected);
        assert!(driver.stop_recording().is_err());

        assert!(driver.disconnect().unwrap().is_none());
        assert_eq!(driver.state(), DriverState::Idle);

        assert!(driver.shutdown().unwrap().is_none());
        assert_eq!(driver.state(), DriverState::Closed);
        assert!(driver.shutdown().unwrap().is_none());
        assert!(driver.connect().is_err());
    }

    #[test]
    fn test_split_line_across_ticks() {
        let (mut driver, sink) = recording_driver();

        let first = driver.ingest(b"12.0,1,1,1,1,1,1,1,1,0,0\n34").unwrap();
        assert_eq!(first.records, 1);
        let second = driver.ingest(b".0,2,2,2,2,2,2,2,2,0,0\n").unwrap();
        assert_eq!(second.records, 1);

        let stamps: Vec<f64> = sink.records().iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(stamps, vec![12.0, 34.0]);
        assert_eq!(driver.buffer().len(), 2);
        assert_eq!(sink.flush_count(), 2);
    }

    #[test]
    fn test_rejected_lines_are_counted_and_reported() {
        let collected = Collected::default();
        let mut driver = PipelineDriver::default().with_diagnostics(Box::new(collected.clone()));
        let sink = InMemorySink::new();
        driver.connect().unwrap();
        driver.start_recording(Box::new(sink.clone())).unwrap();

        let tick = driver
            .ingest(b"abc,1,2,3,4,5,6,7,8,9,10\n\r\n1,2,3,4,5,6,7,8,9,10\n12.0,1,1,1,1,1,1,1,1,0,0\n")
            .unwrap();
        assert_eq!(tick.lines, 4);
        assert_eq!(tick.records, 1);
        assert_eq!(tick.rejected, 3);

        assert_eq!(
            *collected.0.lock().unwrap(),
            vec![
                ParseFailureKind::NumericConversion { field: 0 },
                ParseFailureKind::EmptyLine,
                ParseFailureKind::FieldCount { found: 10 },
            ]
        );

        let stats = driver.session_stats().unwrap();
        assert_eq!(stats.malformed_lines(), 2);
        assert_eq!(stats.empty_lines, 1);
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_sink_failure_ends_session_and_allows_restart() {
        let mut driver = PipelineDriver::default();
        driver.connect().unwrap();
        let failing = InMemorySink::failing_after(1);
        driver.start_recording(Box::new(failing.clone())).unwrap();

        let mut bytes = LINE_A.to_vec();
        bytes.extend_from_slice(LINE_B);
        let err = driver.ingest(&bytes).unwrap_err();
        assert!(matches!(err, DriverError::Sink(_)));
        assert_eq!(driver.state(), DriverState::Connected);
        assert!(failing.is_closed());
        let aborted = driver.take_aborted_report().unwrap();
        assert_eq!(aborted.records_written, 1);
        assert!(aborted.sink_error.is_some());

        // Only the persisted record reached the window
        assert_eq!(driver.buffer().len(), 1);
        assert_eq!(failing.records().len(), 1);

        let fresh = InMemorySink::new();
        driver.start_recording(Box::new(fresh.clone())).unwrap();
        driver.ingest(LINE_B).unwrap();
        assert_eq!(fresh.records().len(), 1);
        assert_eq!(driver.sessions_completed(), 1);
    }

    #[test]
    fn test_no_ingest_after_stop() {
        let (mut driver, sink) = recording_driver();
        driver.ingest(LINE_A).unwrap();
        driver.stop_recording().unwrap();

        assert!(matches!(driver.ingest(LINE_B), Err(DriverError::NotRecording(DriverState::Connected))));
        assert_eq!(sink.records().len(), 1);
        assert_eq!(driver.buffer().len(), 1);
    }

    #[test]
    fn test_start_recording_discards_previous_window_and_fragment() {
        let (mut driver, _) = recording_driver();
        driver.ingest(LINE_A).unwrap();
        driver.ingest(b"99.0,1,1").unwrap();
        driver.stop_recording().unwrap();

        let sink = InMemorySink::new();
        driver.start_recording(Box::new(sink.clone())).unwrap();
        assert!(driver.buffer().is_empty());

        driver.ingest(LINE_B).unwrap();
        let stamps: Vec<f64> = sink.records().iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(stamps, vec![34.0]);
    }

    #[test]
    fn test_render_snapshot() {
        let (mut driver, _) = recording_driver();
        assert!(driver.render_snapshot(&ChannelSet::all()).is_none());

        driver.ingest(LINE_A).unwrap();
        let mut channels = ChannelSet::empty();
        channels.insert(Channel::Pressure2);
        let snap = driver.render_snapshot(&channels).unwrap();
        assert_eq!(snap.timestamps, vec![12.0]);
        assert_eq!(snap.series.len(), 1);

        // Still readable after the session ends
        driver.stop_recording().unwrap();
        assert!(driver.render_snapshot(&channels).is_some());
    }

    #[test]
    fn test_shutdown_closes_open_session() {
        let (mut driver, sink) = recording_driver();
        driver.ingest(LINE_A).unwrap();

        let report = driver.shutdown().unwrap().unwrap();
        assert_eq!(report.records_written, 1);
        assert!(sink.is_closed());
        assert_eq!(driver.state(), DriverState::Closed);
        assert_eq!(driver.totals().records_accepted, 1);
    }
}
