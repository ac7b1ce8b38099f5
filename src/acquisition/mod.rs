//! Telemetry acquisition
//!
//! Byte sources, line reassembly and record parsing: everything between the
//! device and a typed [`Record`](crate::types::Record).

pub mod line_assembler;
pub mod record_parser;
pub mod source;

pub use line_assembler::{CompleteLines, LineAssembler};
pub use record_parser::{parse_line, ParseFailure, ParseFailureKind};
pub use source::{
    ByteSource, ChunkSource, ReplaySource, SourceError, StdinSource, StreamSource, TcpSource,
};
