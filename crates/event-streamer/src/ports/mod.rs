//! Ports layer.

pub mod outbound;

pub use outbound::{
    AdapterFactory, AdapterHandle, DisconnectSignal, EventStream, OutboundTransport,
    PreferenceSource,
};
