//! Stream Configuration Module
//!
//! Operator-tunable values loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `PMMG_CONFIG` environment variable (path to TOML file)
//! 2. `pmmg_stream.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded [`StreamConfig`] is handed to the runner and sources
//! explicitly; there is no process-wide config instance.

pub mod defaults;
mod stream_config;
pub mod validation;

pub use stream_config::*;
pub use validation::ValidationWarning;
