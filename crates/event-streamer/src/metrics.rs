//! Stream metrics.
//!
//! Shared by every session of one service; exposed as JSON at `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Event streamer metrics
#[derive(Debug, Default)]
pub struct StreamMetrics {
    // Session gauges
    pub sessions_active: AtomicU64,
    pub sessions_total: AtomicU64,

    // Reconciliation counters
    pub adapters_connected: AtomicU64,
    pub connect_failures: AtomicU64,
    pub probe_failures: AtomicU64,
    pub evictions: AtomicU64,
    pub announcements: AtomicU64,

    // Listener gauges/counters
    pub listeners_active: AtomicU64,
    pub subscribe_failures: AtomicU64,

    // Relay counters
    pub events_relayed: AtomicU64,
    pub transport_failures: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_opened(&self) {
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_connected(&self) {
        self.adapters_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_announcement(&self) {
        self.announcements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_started(&self) {
        self.listeners_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_finished(&self) {
        self.listeners_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_subscribe_failure(&self) {
        self.subscribe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_relayed(&self) {
        self.events_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Name/value pairs of every metric, for exporters.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("sessions_active", self.sessions_active.load(Ordering::Relaxed)),
            ("sessions_total", self.sessions_total.load(Ordering::Relaxed)),
            ("adapters_connected", self.adapters_connected.load(Ordering::Relaxed)),
            ("connect_failures", self.connect_failures.load(Ordering::Relaxed)),
            ("probe_failures", self.probe_failures.load(Ordering::Relaxed)),
            ("evictions", self.evictions.load(Ordering::Relaxed)),
            ("announcements", self.announcements.load(Ordering::Relaxed)),
            ("listeners_active", self.listeners_active.load(Ordering::Relaxed)),
            ("subscribe_failures", self.subscribe_failures.load(Ordering::Relaxed)),
            ("events_relayed", self.events_relayed.load(Ordering::Relaxed)),
            ("transport_failures", self.transport_failures.load(Ordering::Relaxed)),
        ]
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .snapshot()
            .into_iter()
            .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
            .collect();
        serde_json::Value::Object(map)
    }
}
