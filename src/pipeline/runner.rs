//! Pipeline Runner - drives both cadences from one task
//!
//! ```text
//!   ingest tick (fast, only while Recording)
//!     source.read_available() -> driver.ingest() -> sink + window
//!   render tick (slow)
//!     driver.render_snapshot() -> renderer.render()
//!   commands / cancellation
//!     start, stop, shutdown between ticks
//! ```
//!
//! Everything runs inside one `tokio::select!` loop, so a render tick never
//! observes a half-processed ingestion batch.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::driver::{DriverError, PipelineDriver};
use super::renderer::Renderer;
use super::state::{DriverState, PipelineStats, SessionReport};
use crate::acquisition::{ByteSource, SourceError};
use crate::config::StreamConfig;
use crate::storage::{FileSink, PersistenceSink, SessionTarget, SinkError};

/// Pending commands allowed before senders wait.
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Control messages for a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    StartRecording(SessionTarget),
    StopRecording,
    Shutdown,
}

/// Why [`PipelineRunner::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The cancellation token fired
    Cancelled,
    /// A [`DriverCommand::Shutdown`] was received
    Shutdown,
    /// The byte source reached end of stream
    SourceClosed,
    /// The session ended and the runner was asked to exit with it
    SessionEnded,
}

/// Final outcome of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub end: RunEnd,
    pub sessions: Vec<SessionReport>,
    pub totals: PipelineStats,
}

/// Opens the sink for a `StartRecording` command.
pub type SinkOpener =
    Box<dyn FnMut(&SessionTarget) -> Result<Box<dyn PersistenceSink>, SinkError> + Send>;

fn open_file_sink(target: &SessionTarget) -> Result<Box<dyn PersistenceSink>, SinkError> {
    Ok(Box::new(FileSink::open(target)?))
}

pub struct PipelineRunner<S, R> {
    driver: PipelineDriver,
    source: S,
    renderer: R,
    commands: mpsc::Receiver<DriverCommand>,
    cancel: CancellationToken,
    ingest_interval: Duration,
    render_interval: Duration,
    open_sink: SinkOpener,
    exit_when_session_ends: bool,
    sessions_started: u64,
    sessions: Vec<SessionReport>,
}

impl<S: ByteSource, R: Renderer> PipelineRunner<S, R> {
    /// Build a runner and the sender used to control it.
    pub fn new(
        config: &StreamConfig,
        source: S,
        renderer: R,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<DriverCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let runner = Self {
            driver: PipelineDriver::from_config(config),
            source,
            renderer,
            commands: rx,
            cancel,
            ingest_interval: config.ingest_interval(),
            render_interval: config.render_interval(),
            open_sink: Box::new(open_file_sink),
            exit_when_session_ends: false,
            sessions_started: 0,
            sessions: Vec::new(),
        };
        (runner, tx)
    }

    /// Replace the default [`FileSink`] opener.
    pub fn with_sink_opener<F>(mut self, opener: F) -> Self
    where
        F: FnMut(&SessionTarget) -> Result<Box<dyn PersistenceSink>, SinkError> + Send + 'static,
    {
        self.open_sink = Box::new(opener);
        self
    }

    /// Return once a session has ended instead of waiting for the next
    /// command. Failing to start a session then also ends the run.
    pub fn exit_when_session_ends(mut self, exit: bool) -> Self {
        self.exit_when_session_ends = exit;
        self
    }

    pub fn driver(&self) -> &PipelineDriver {
        &self.driver
    }

    /// Run until cancelled, shut down, or the source closes.
    ///
    /// Source failures other than end of stream end the run with
    /// [`DriverError::Source`] after the open session has been closed.
    pub async fn run(mut self) -> Result<RunReport, DriverError> {
        self.driver.connect()?;
        info!(
            source = %self.source.source_name(),
            ingest_ms = self.ingest_interval.as_millis() as u64,
            render_ms = self.render_interval.as_millis() as u64,
            "🚀 Pipeline running"
        );

        let mut ingest = tokio::time::interval(self.ingest_interval);
        ingest.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut render = tokio::time::interval(self.render_interval);
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut commands_open = true;

        let end = loop {
            let recording = self.driver.is_recording();

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break RunEnd::Cancelled;
                }

                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(DriverCommand::Shutdown) => break RunEnd::Shutdown,
                        Some(command) => {
                            if let Err(e) = self.handle_command(command) {
                                if self.exit_when_session_ends {
                                    self.finish();
                                    return Err(e);
                                }
                                warn!(error = %e, "Command failed");
                            }
                        }
                        None => commands_open = false,
                    }
                }

                _ = ingest.tick(), if recording => {
                    match self.ingest_tick().await {
                        Ok(()) => {}
                        Err(DriverError::Source(SourceError::Closed)) => {
                            info!(source = %self.source.source_name(), "Source reached end of stream");
                            break RunEnd::SourceClosed;
                        }
                        Err(e) => {
                            error!(error = %e, "Byte source failed");
                            self.finish();
                            return Err(e);
                        }
                    }
                }

                _ = render.tick() => self.render_tick(),
            }

            if self.exit_when_session_ends && self.sessions_started > 0 && !self.driver.is_recording() {
                break RunEnd::SessionEnded;
            }
        };

        self.finish();
        let totals = self.driver.totals();
        info!(?end, sessions = self.sessions.len(), %totals, "Pipeline stopped");

        Ok(RunReport {
            end,
            sessions: self.sessions,
            totals,
        })
    }

    fn handle_command(&mut self, command: DriverCommand) -> Result<(), DriverError> {
        match command {
            DriverCommand::StartRecording(target) => {
                if self.driver.state() != DriverState::Connected {
                    return Err(DriverError::InvalidTransition {
                        state: self.driver.state(),
                        action: "start recording",
                    });
                }
                let sink = (self.open_sink)(&target)?;
                self.driver.start_recording(sink)?;
                self.sessions_started += 1;
            }
            DriverCommand::StopRecording => {
                let report = self.driver.stop_recording();
                self.collect_aborted();
                self.sessions.push(report?);
            }
            DriverCommand::Shutdown => {}
        }
        Ok(())
    }

    /// Read whatever arrived and push it through the driver.
    ///
    /// A sink failure ends only the session; the run continues.
    async fn ingest_tick(&mut self) -> Result<(), DriverError> {
        let bytes = match self.source.read_available().await {
            Ok(bytes) => bytes,
            Err(e) => {
                if self.driver.is_recording() {
                    match self.driver.stop_recording() {
                        Ok(report) => self.sessions.push(report),
                        Err(close_err) => warn!(error = %close_err, "Failed to close session sink"),
                    }
                }
                return Err(DriverError::Source(e));
            }
        };

        match self.driver.ingest(&bytes) {
            Ok(_) => Ok(()),
            Err(DriverError::Sink(e)) => {
                warn!(error = %e, "Recording session aborted");
                self.collect_aborted();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn render_tick(&mut self) {
        let channels = self.renderer.enabled_channels();
        if let Some(snapshot) = self.driver.render_snapshot(&channels) {
            self.renderer.render(&snapshot);
        }
    }

    fn collect_aborted(&mut self) {
        if let Some(report) = self.driver.take_aborted_report() {
            self.sessions.push(report);
        }
    }

    /// Close the driver, keeping the final session report.
    fn finish(&mut self) {
        match self.driver.shutdown() {
            Ok(Some(report)) => self.sessions.push(report),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to close session cleanly"),
        }
        self.collect_aborted();
    }
}
