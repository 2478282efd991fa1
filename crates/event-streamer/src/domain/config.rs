//! Streamer configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default reconciliation interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default output buffer capacity (payloads)
pub const DEFAULT_OUTPUT_BUFFER_CAPACITY: usize = 100;

/// Main streamer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Interval between reconciliation ticks
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Bound of the shared output buffer; producers block when full
    pub output_buffer_capacity: usize,
    /// Upper bound for one adapter connection attempt
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Upper bound for one liveness probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// HTTP server configuration
    pub http: HttpConfig,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            output_buffer_capacity: DEFAULT_OUTPUT_BUFFER_CAPACITY,
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            http: HttpConfig::default(),
        }
    }
}

impl StreamerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "poll_interval cannot be 0".into(),
            ));
        }

        if self.output_buffer_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }

        if self.connect_timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "adapter timeouts cannot be 0".into(),
            ));
        }

        if !self.http.events_path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.http.events_path.clone()));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 9081)
    pub port: u16,
    /// Route serving the event stream
    pub events_path: String,
    /// Answer with `Access-Control-Allow-Origin: *`
    pub cors_allow_any_origin: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 9081,
            events_path: "/api/events".to_string(),
            cors_allow_any_origin: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("output_buffer_capacity must be greater than 0")]
    InvalidCapacity,

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("events path must start with '/': {0}")]
    InvalidPath(String),
}
