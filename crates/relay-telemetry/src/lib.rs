//! # Relay Telemetry
//!
//! Logging and metrics bootstrap for the mesh relay node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RELAY_SERVICE_NAME` | `mesh-relay` | Service name in log lines |
//! | `RELAY_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `RELAY_JSON_LOGS` | `true` in containers | JSON formatted logs |
//! | `RELAY_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{encode_metrics, export_stream_metrics, register_metrics, REGISTRY, STREAM_METRICS};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    init_logging(config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
