//! Stream Configuration - operator-tunable TOML values
//!
//! Each section implements `Default` with the values in
//! [`defaults`](super::defaults), so a missing file or a missing key behaves
//! exactly like the built-in configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::storage::SinkFormat;
use crate::types::{Channel, ChannelSet};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a recorder deployment.
///
/// Load with [`StreamConfig::load`] which searches:
/// 1. `$PMMG_CONFIG`
/// 2. `./pmmg_stream.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Live window sizing
    #[serde(default)]
    pub window: WindowConfig,

    /// Tick cadences
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Byte source limits
    #[serde(default)]
    pub source: SourceConfig,

    /// Session file output
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Renderer channel selection
    #[serde(default)]
    pub render: RenderConfig,
}

impl StreamConfig {
    /// Load configuration using the standard search order, falling back to
    /// defaults (with a warning) when a file exists but cannot be used.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded stream config from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded stream config from ./{}", defaults::CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::CONFIG_FILE_NAME);
                }
            }
        }

        info!("No {} found, using built-in defaults", defaults::CONFIG_FILE_NAME);
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every value, collecting all problems instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let horizon = self.window.horizon_ms;
        if !horizon.is_finite() || horizon <= 0.0 {
            errors.push(format!("window.horizon_ms must be a positive finite number, got {horizon}"));
        }

        let s = &self.schedule;
        if s.ingest_interval_ms == 0 {
            errors.push("schedule.ingest_interval_ms must be > 0".to_string());
        }
        for (name, value) in [
            ("schedule.ingest_interval_ms", s.ingest_interval_ms),
            ("schedule.render_interval_ms", s.render_interval_ms),
        ] {
            if value > defaults::MAX_INTERVAL_MS {
                errors.push(format!("{name} must be <= {} ms, got {value}", defaults::MAX_INTERVAL_MS));
            }
        }
        if s.render_interval_ms < s.ingest_interval_ms {
            errors.push(format!(
                "schedule.render_interval_ms ({}) must be >= ingest_interval_ms ({})",
                s.render_interval_ms, s.ingest_interval_ms
            ));
        }

        let src = &self.source;
        if src.read_timeout_ms >= s.ingest_interval_ms.max(1).saturating_mul(10) {
            errors.push(format!(
                "source.read_timeout_ms ({}) is too long for an ingest interval of {} ms",
                src.read_timeout_ms, s.ingest_interval_ms
            ));
        }
        for (name, value) in [
            ("source.max_read_bytes", src.max_read_bytes),
            ("source.max_fragment_bytes", src.max_fragment_bytes),
            ("source.replay_chunk_bytes", src.replay_chunk_bytes),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }

        if self.recording.file_prefix.trim().is_empty() {
            errors.push("recording.file_prefix must not be empty".to_string());
        }

        for name in &self.render.channels {
            if !is_channel_spec(name) {
                errors.push(format!("render.channels: unknown channel '{name}'"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_millis(self.schedule.ingest_interval_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.schedule.render_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.source.read_timeout_ms)
    }

    /// Channels the renderer starts with. An unparseable list (only possible
    /// if `validate` was skipped) falls back to every channel.
    pub fn render_channels(&self) -> ChannelSet {
        ChannelSet::parse_list(&self.render.channels.join(",")).unwrap_or_default()
    }
}

fn is_channel_spec(name: &str) -> bool {
    matches!(name.trim().to_ascii_lowercase().as_str(), "all" | "pressure")
        || name.parse::<Channel>().is_ok()
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Config parse error ({}): {source}", .path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// Live window sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Records older than `newest - horizon_ms` are evicted.
    #[serde(default = "default_horizon_ms")]
    pub horizon_ms: f64,
}

fn default_horizon_ms() -> f64 { defaults::HORIZON_MS }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            horizon_ms: default_horizon_ms(),
        }
    }
}

/// Tick cadences for the single-threaded runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_ingest_interval_ms")]
    pub ingest_interval_ms: u64,

    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,
}

fn default_ingest_interval_ms() -> u64 { defaults::INGEST_INTERVAL_MS }
fn default_render_interval_ms() -> u64 { defaults::RENDER_INTERVAL_MS }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingest_interval_ms: default_ingest_interval_ms(),
            render_interval_ms: default_render_interval_ms(),
        }
    }
}

/// Byte source limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Wait for the first read of a tick (ms).
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: usize,

    #[serde(default = "default_max_fragment_bytes")]
    pub max_fragment_bytes: usize,

    #[serde(default = "default_replay_chunk_bytes")]
    pub replay_chunk_bytes: usize,
}

fn default_read_timeout_ms() -> u64 { defaults::READ_TIMEOUT_MS }
fn default_max_read_bytes() -> usize { defaults::MAX_READ_BYTES }
fn default_max_fragment_bytes() -> usize { defaults::MAX_FRAGMENT_BYTES }
fn default_replay_chunk_bytes() -> usize { defaults::REPLAY_CHUNK_BYTES }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            max_read_bytes: default_max_read_bytes(),
            max_fragment_bytes: default_max_fragment_bytes(),
            replay_chunk_bytes: default_replay_chunk_bytes(),
        }
    }
}

/// Session file output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub format: SinkFormat,

    /// Replace an existing file instead of refusing to start the session.
    #[serde(default)]
    pub overwrite: bool,
}

fn default_output_dir() -> PathBuf { PathBuf::from(defaults::OUTPUT_DIR) }
fn default_file_prefix() -> String { defaults::FILE_PREFIX.to_string() }

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            format: SinkFormat::default(),
            overwrite: false,
        }
    }
}

/// Renderer channel selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Channel names (`pressure1`, `p1`, `fsr_left`, ... or `all`).
    #[serde(default = "default_render_channels")]
    pub channels: Vec<String>,
}

fn default_render_channels() -> Vec<String> {
    vec!["all".to_string()]
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            channels: default_render_channels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.horizon_ms, 10_000.0);
        assert_eq!(config.render_channels(), ChannelSet::all());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = StreamConfig::from_toml_str(
            r#"
            [window]
            horizon_ms = 5000.0

            [recording]
            format = "text"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.horizon_ms, 5000.0);
        assert_eq!(config.recording.format, SinkFormat::Text);
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.recording.file_prefix, "pmmg");
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = StreamConfig::default();
        config.window.horizon_ms = -1.0;
        config.schedule.render_interval_ms = 1;
        config.source.max_read_bytes = 0;
        config.render.channels = vec!["p1".to_string(), "p9".to_string()];

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("horizon_ms")));
        assert!(errors.iter().any(|e| e.contains("'p9'")));
    }

    #[test]
    fn test_huge_intervals_rejected_without_overflow() {
        let result = StreamConfig::from_toml_str(
            "[schedule]\ningest_interval_ms = 9223372036854775807\nrender_interval_ms = 9223372036854775807\n",
        );
        let Err(ConfigError::Validation(errors)) = result else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().all(|e| e.contains("must be <= 60000 ms")));

        let mut config = StreamConfig::default();
        config.schedule.ingest_interval_ms = u64::MAX;
        config.schedule.render_interval_ms = u64::MAX;
        config.source.read_timeout_ms = u64::MAX;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.contains("read_timeout_ms")));
    }

    #[test]
    fn test_nan_horizon_rejected() {
        let mut config = StreamConfig::default();
        config.window.horizon_ms = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_render_channels_subset() {
        let mut config = StreamConfig::default();
        config.render.channels = vec!["p1".to_string(), "fsr_r".to_string()];
        let set = config.render_channels();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Channel::Pressure1, Channel::FsrRight]);
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = StreamConfig::default();
        let text = config.to_toml().unwrap();
        let back = StreamConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_load_from_file_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[window\nhorizon_ms = 1").unwrap();

        let err = StreamConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: ref p, .. } if p == &path));
    }
}
