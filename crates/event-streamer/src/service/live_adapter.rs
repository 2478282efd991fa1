//! Close-exactly-once wrapper around a collaborator adapter handle.

use crate::domain::{AdapterError, ConnectionContext};
use crate::ports::{AdapterHandle, EventStream};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A live adapter connection keyed by its location.
///
/// The collaborator's `close` runs at most once, whichever of eviction,
/// listener exit or session teardown gets there first.
pub struct LiveAdapter {
    location: String,
    handle: Box<dyn AdapterHandle>,
    closed: watch::Sender<bool>,
}

impl LiveAdapter {
    pub fn new(location: impl Into<String>, handle: Box<dyn AdapterHandle>) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            location: location.into(),
            handle,
            closed,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Liveness probe. A closed handle always fails.
    pub async fn probe(&self, ctx: &ConnectionContext) -> Result<(), AdapterError> {
        if !self.is_open() {
            return Err(AdapterError::Closed);
        }
        self.handle.probe(ctx).await
    }

    pub async fn subscribe(&self, ctx: &ConnectionContext) -> Result<EventStream, AdapterError> {
        if !self.is_open() {
            return Err(AdapterError::Closed);
        }
        self.handle.subscribe(ctx).await
    }

    /// Close the handle. Returns `true` only for the call that actually closed it.
    pub async fn close(&self) -> bool {
        // send_replace returns the previous value; only the first caller sees `false`.
        if self.closed.send_replace(true) {
            return false;
        }

        match self.handle.close().await {
            Ok(()) => debug!(location = %self.location, "Adapter handle closed"),
            Err(e) => warn!(location = %self.location, error = %e, "Error closing adapter handle"),
        }
        true
    }

    /// Resolves once the handle has been closed by anyone.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for LiveAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveAdapter")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish()
    }
}
