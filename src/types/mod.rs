//! Shared data structures for the pMMG telemetry pipeline
//!
//! - [`Record`]: one parsed telemetry sample (timestamp + ten channels)
//! - [`Channel`] / [`ChannelSet`]: channel identifiers and the renderer's
//!   enabled-channel selection

mod channel;
mod record;

pub use channel::*;
pub use record::*;
