//! Event Streamer - server-push fan-in of backend adapter event streams.
//!
//! One client connection gets one long-lived stream. While it is open, a
//! reconciliation loop keeps the set of live adapter connections aligned
//! with the user's preferences, and every adapter's events are relayed into
//! that single stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        STREAM SESSION (per client)                    │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  PreferenceSource                                                     │
//! │        │ poll every interval                                          │
//! │  ┌─────┴──────┐  connect / probe / evict  ┌──────────────────┐       │
//! │  │ Reconciler ├──────────────────────────►│ AdapterRegistry  │       │
//! │  └─────┬──────┘                           └──────────────────┘       │
//! │        │ announce (new handles only)                                  │
//! │  ┌─────┴───────────┐                                                  │
//! │  │ ListenerSpawner │──► listener ─┐                                   │
//! │  └─────────────────┘──► listener ─┼──► OutputBuffer (bounded)         │
//! │                     ──► listener ─┘          │                        │
//! │                                        ┌─────┴──────┐                 │
//! │                                        │ OutputRelay├──► transport    │
//! │                                        └────────────┘                 │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use event_streamer::{EventStreamService, StreamerConfig};
//!
//! let service = EventStreamService::new(StreamerConfig::default(), factory, preferences)?;
//! service.start().await?;
//! ```
//!
//! # Guarantees
//!
//! - At most one live adapter connection per location
//! - Each adapter is announced to a listener once per connection it makes
//! - Events from one adapter reach the client in order
//! - A full output buffer blocks producers, nothing is dropped
//! - Every adapter handle is closed exactly once

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod server;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports
pub use adapters::{event_stream_response, sse_channel, SseTransport};
pub use domain::{
    AdapterConfig, AdapterError, AdapterEvent, BufferClosed, ClusterAccess, ConfigError,
    ConnectionContext, EventType, HttpConfig, Preference, StreamerConfig, StreamerError,
    TransportError,
};
pub use metrics::StreamMetrics;
pub use ports::{
    AdapterFactory, AdapterHandle, DisconnectSignal, EventStream, OutboundTransport,
    PreferenceSource,
};
pub use server::EventStreamService;
pub use service::{SessionReport, StreamSession};
