//! Domain layer: configuration, errors, preference/event types and the
//! connection context.

pub mod config;
pub mod context;
pub mod error;
pub mod types;

pub use config::{ConfigError, HttpConfig, StreamerConfig};
pub use context::ConnectionContext;
pub use error::{AdapterError, BufferClosed, StreamerError, TransportError};
pub use types::{AdapterConfig, AdapterEvent, ClusterAccess, EventType, Preference};
