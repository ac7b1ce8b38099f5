//! pmmg-stream: pMMG Telemetry Recorder
//!
//! Ingests the ASCII telemetry stream of a pMMG pressure sensor array (eight
//! pressure channels plus two force-sensing resistors), keeps a sliding time
//! window for live display, and persists every valid record of a recording
//! session.
//!
//! ## Architecture
//!
//! - **Acquisition**: byte sources, line reassembly, record parsing
//! - **Buffer**: column-wise live window with horizon eviction
//! - **Storage**: session sinks (`csv` / aligned `text`) and read-back
//! - **Pipeline**: driver state machine and the single-task runner
//!
//! ```ignore
//! let config = StreamConfig::load();
//! let (runner, commands) = PipelineRunner::new(&config, StreamSource::stdin(), NullRenderer, cancel);
//! commands.send(DriverCommand::StartRecording(target)).await?;
//! let report = runner.run().await?;
//! ```

pub mod acquisition;
pub mod buffer;
pub mod config;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use acquisition::{parse_line, ByteSource, LineAssembler, ParseFailure, ParseFailureKind, SourceError};
pub use buffer::{ChannelSeries, Snapshot, WindowedBuffer};
pub use config::StreamConfig;
pub use pipeline::{
    DriverCommand, DriverError, DriverState, PipelineDriver, PipelineRunner, PipelineStats,
    Renderer, RunEnd, RunReport, SessionReport,
};
pub use storage::{FileSink, InMemorySink, PersistenceSink, SessionTarget, SinkError, SinkFormat};
pub use types::{Channel, ChannelSet, Record};
