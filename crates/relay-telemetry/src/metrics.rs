//! Prometheus metrics for the relay.
//!
//! The event streamer keeps its own atomic counters; they are mirrored into
//! one gauge family here, right before each scrape:
//!
//! ```text
//! relay_stream_metric{name="events_relayed"} 42
//! ```

use lazy_static::lazy_static;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Stream metrics mirrored from the event streamer, labelled by name
    pub static ref STREAM_METRICS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("relay_stream_metric", "Event streamer counters and gauges"),
        &["name"]
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    match REGISTRY.register(Box::new(STREAM_METRICS.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(TelemetryError::MetricsInit(e.to_string())),
    }
}

/// Mirror a `(name, value)` snapshot into [`STREAM_METRICS`].
pub fn export_stream_metrics<'a>(snapshot: impl IntoIterator<Item = (&'a str, u64)>) {
    for (name, value) in snapshot {
        STREAM_METRICS
            .with_label_values(&[name])
            .set(i64::try_from(value).unwrap_or(i64::MAX));
    }
}

/// Encode every registered metric in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
