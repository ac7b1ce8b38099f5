//! Pipeline Module
//!
//! ```text
//! ByteSource ──bytes──> LineAssembler ──lines──> parse_line ──records──┬──> PersistenceSink
//!                                                     │                └──> WindowedBuffer ──> Renderer
//!                                                     └──failures──> DiagnosticSink
//! ```
//!
//! [`PipelineDriver`] is the synchronous state machine; [`PipelineRunner`]
//! schedules it on two intervals inside a single task.

mod driver;
pub mod renderer;
mod runner;
mod state;

pub use driver::{DiagnosticSink, DriverError, PipelineDriver, TracingDiagnostics};
pub use renderer::{JsonLinesRenderer, LogRenderer, NullRenderer, Renderer};
pub use runner::{DriverCommand, PipelineRunner, RunEnd, RunReport, SinkOpener};
pub use state::*;
