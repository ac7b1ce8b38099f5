//! System-wide default constants.
//!
//! Every tunable here has a matching `StreamConfig` field; these are the
//! values used when no config file sets them.

// ============================================================================
// Live Window
// ============================================================================

/// Live window horizon (ms of device time).
pub const HORIZON_MS: f64 = 10_000.0;

// ============================================================================
// Scheduling
// ============================================================================

/// Ingestion cadence (ms). The device streams at 921 600 baud, roughly
/// 1 500 lines per second, so a 10 ms tick moves ~15 lines.
pub const INGEST_INTERVAL_MS: u64 = 10;

/// Render cadence (ms). 10 Hz is smooth enough for a live plot.
pub const RENDER_INTERVAL_MS: u64 = 100;

/// Upper bound accepted for either cadence (ms).
pub const MAX_INTERVAL_MS: u64 = 60_000;

// ============================================================================
// Byte Source
// ============================================================================

/// Wait for the first read of an ingestion tick (ms).
pub const READ_TIMEOUT_MS: u64 = 5;

/// Upper bound on bytes pulled from the source in one tick.
pub const MAX_READ_BYTES: usize = 64 * 1024;

/// Longest partial line kept while waiting for a terminator.
pub const MAX_FRAGMENT_BYTES: usize = 64 * 1024;

/// Chunk size for file replay (bytes per ingestion tick).
pub const REPLAY_CHUNK_BYTES: usize = 4 * 1024;

/// TCP connect timeout (seconds).
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Recording
// ============================================================================

/// Directory for session files when no explicit output path is given.
pub const OUTPUT_DIR: &str = "./data";

/// Session file name prefix.
pub const FILE_PREFIX: &str = "pmmg";

/// Config file searched in the working directory.
pub const CONFIG_FILE_NAME: &str = "pmmg_stream.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PMMG_CONFIG";
