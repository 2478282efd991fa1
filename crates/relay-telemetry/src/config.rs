//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or full directives
    pub log_level: String,

    /// Whether to write logs to stdout
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "mesh-relay".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `RELAY_SERVICE_NAME`: Service name (default: mesh-relay)
    /// - `RELAY_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `RELAY_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `RELAY_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("RELAY_SERVICE_NAME").unwrap_or_else(|| "mesh-relay".to_string()),

            log_level: lookup("RELAY_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),

            console_output: lookup("RELAY_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: lookup("RELAY_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }
}
