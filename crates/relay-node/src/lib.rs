//! # Relay Node Library
//!
//! Wiring for the mesh relay executable, exposed for integration tests.
//!
//! - `container/` - configuration and the [`RelayNode`] that owns the service
//! - `adapters/` - HTTP adapter client and file-backed preference store

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod container;

pub use adapters::{ndjson_events, FilePreferenceStore, HttpAdapter, HttpAdapterFactory};
pub use container::{AdapterClientConfig, ConfigError, NodeConfig, RelayNode};
