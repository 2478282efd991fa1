//! Per-connection cancellation context.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Cancellation context for one client connection.
///
/// Cloned into every task of the session and into every collaborator call.
/// Cancellation is one-way: once cancelled it stays cancelled.
#[derive(Clone)]
pub struct ConnectionContext {
    id: Uuid,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// Connection identifier used in log fields.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the context. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
