//! # Node Configuration
//!
//! Loaded from the TOML file named by `RELAY_CONFIG` (defaults when unset),
//! then overridden from the environment:
//!
//! - `RELAY_HTTP_PORT`: event stream server port
//! - `RELAY_PREFERENCES`: path of the preference document

use event_streamer::{ConfigError as StreamerConfigError, StreamerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Event streamer configuration (interval, buffer, timeouts, HTTP).
    pub streamer: StreamerConfig,
    /// Preference document read on every reconciliation tick.
    pub preferences_path: PathBuf,
    /// HTTP adapter client configuration.
    pub adapter_client: AdapterClientConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            streamer: StreamerConfig::default(),
            preferences_path: PathBuf::from("./preferences.json"),
            adapter_client: AdapterClientConfig::default(),
        }
    }
}

/// HTTP adapter client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterClientConfig {
    /// URL scheme used when an adapter location carries none.
    pub default_scheme: String,
    /// TCP connect timeout for adapter requests.
    #[serde(with = "humantime_serde")]
    pub tcp_connect_timeout: Duration,
    /// Longest event line accepted from an adapter; a longer one ends its stream.
    pub max_event_bytes: usize,
}

impl Default for AdapterClientConfig {
    fn default() -> Self {
        Self {
            default_scheme: "http".to_string(),
            tcp_connect_timeout: Duration::from_secs(3),
            max_event_bytes: 1024 * 1024,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("adapter_client.max_event_bytes cannot be 0")]
    InvalidEventLimit,

    #[error(transparent)]
    Streamer(#[from] StreamerConfigError),
}

impl NodeConfig {
    /// Load from `RELAY_CONFIG` and the environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("RELAY_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        config.streamer.validate()?;
        if config.adapter_client.max_event_bytes == 0 {
            return Err(ConfigError::InvalidEventLimit);
        }
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = lookup("RELAY_HTTP_PORT") {
            self.streamer.http.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "RELAY_HTTP_PORT",
                value: port,
            })?;
        }
        if let Some(path) = lookup("RELAY_PREFERENCES") {
            self.preferences_path = PathBuf::from(path);
        }
        Ok(())
    }
}
