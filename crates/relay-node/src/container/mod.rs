//! # Node Container
//!
//! Configuration and wiring of the concrete collaborators into the event
//! stream service.

pub mod config;
pub mod node;

pub use config::{AdapterClientConfig, ConfigError, NodeConfig};
pub use node::RelayNode;
