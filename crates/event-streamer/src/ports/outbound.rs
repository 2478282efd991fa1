//! Outbound ports: the collaborators the streamer drives.
//!
//! ```text
//!  PreferenceSource ──► Reconciler ──► AdapterFactory ──► AdapterHandle
//!                                                            │ subscribe
//!                                                            ▼
//!                              OutboundTransport ◄── relay ◄── listener
//! ```

use crate::domain::{
    AdapterError, AdapterEvent, ClusterAccess, ConnectionContext, Preference, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// Lazy sequence of events from one subscription.
pub type EventStream = BoxStream<'static, Result<AdapterEvent, AdapterError>>;

/// Edge-triggered signal that resolves once, when the client goes away.
pub type DisconnectSignal = BoxFuture<'static, ()>;

/// One live connection to a backend adapter.
#[async_trait]
pub trait AdapterHandle: Send + Sync {
    /// Cheap round-trip confirming the connection is usable.
    async fn probe(&self, ctx: &ConnectionContext) -> Result<(), AdapterError>;

    /// Open a server-initiated event sequence scoped to `ctx`.
    async fn subscribe(&self, ctx: &ConnectionContext) -> Result<EventStream, AdapterError>;

    /// Release the connection. Called at most once per handle by the streamer.
    async fn close(&self) -> Result<(), AdapterError>;
}

/// Establishes connections to named adapters.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn connect(
        &self,
        ctx: &ConnectionContext,
        access: &ClusterAccess,
        location: &str,
    ) -> Result<Box<dyn AdapterHandle>, AdapterError>;
}

/// Read-only view of the user's preferences, polled once per tick.
pub trait PreferenceSource: Send + Sync {
    fn current(&self) -> Preference;
}

/// Server-push response the relay writes framed records into.
#[async_trait]
pub trait OutboundTransport: Send + 'static {
    async fn write(&mut self, record: Bytes) -> Result<(), TransportError>;

    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Signal resolving when the client disconnects.
    fn disconnect_signal(&self) -> DisconnectSignal;
}
