//! Listener spawner and per-adapter event listeners.
//!
//! The spawner consumes announcements of freshly connected adapters and
//! starts one independent listener task per adapter. A listener drains its
//! adapter's subscription into the output buffer and, whatever ends it,
//! closes the adapter handle.

use super::buffer::OutputBuffer;
use super::live_adapter::LiveAdapter;
use crate::domain::{AdapterError, AdapterEvent, ConnectionContext};
use crate::metrics::StreamMetrics;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Why a listener stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// Subscription could not be opened
    SubscribeFailed(AdapterError),
    /// Adapter ended the stream gracefully
    EndOfStream,
    /// Stream broke mid-flight
    ReceiveFailed(AdapterError),
    /// Event could not be encoded
    EncodeFailed(String),
    /// Output buffer was closed
    BufferClosed,
    /// Handle was closed elsewhere (evicted)
    HandleClosed,
    /// Connection context was cancelled
    Cancelled,
}

/// Dispatches one listener task per announced adapter.
pub struct ListenerSpawner {
    announcements: mpsc::UnboundedReceiver<Arc<LiveAdapter>>,
    buffer: OutputBuffer,
    ctx: ConnectionContext,
    metrics: Arc<StreamMetrics>,
}

impl ListenerSpawner {
    pub fn new(
        announcements: mpsc::UnboundedReceiver<Arc<LiveAdapter>>,
        buffer: OutputBuffer,
        ctx: ConnectionContext,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            announcements,
            buffer,
            ctx,
            metrics,
        }
    }

    /// Run until the announcement channel closes, then wait for every
    /// listener already started. Returns the number of listeners spawned.
    pub async fn run(self) -> usize {
        let Self {
            mut announcements,
            buffer,
            ctx,
            metrics,
        } = self;

        let mut listeners = JoinSet::new();
        let mut spawned = 0;

        while let Some(adapter) = announcements.recv().await {
            debug!(
                connection_id = %ctx.id(),
                location = %adapter.location(),
                "Received a new adapter, listening for events"
            );
            listeners.spawn(listen_for_adapter_events(
                adapter,
                buffer.clone(),
                ctx.clone(),
                Arc::clone(&metrics),
            ));
            spawned += 1;

            while let Some(finished) = listeners.try_join_next() {
                log_join_error(finished.err());
            }
        }
        debug!(connection_id = %ctx.id(), "Announcement channel closed");

        drop(buffer);
        while let Some(finished) = listeners.join_next().await {
            log_join_error(finished.err());
        }
        spawned
    }
}

fn log_join_error(error: Option<tokio::task::JoinError>) {
    if let Some(e) = error {
        error!(error = %e, "Adapter listener task failed");
    }
}

/// Drain one adapter's events into the output buffer, then close its handle.
pub async fn listen_for_adapter_events(
    adapter: Arc<LiveAdapter>,
    buffer: OutputBuffer,
    ctx: ConnectionContext,
    metrics: Arc<StreamMetrics>,
) -> ListenerExit {
    metrics.record_listener_started();

    let exit = drain_events(&adapter, &buffer, &ctx).await;
    match &exit {
        ListenerExit::SubscribeFailed(e) => {
            metrics.record_subscribe_failure();
            error!(
                location = %adapter.location(),
                error = %e,
                "There was an error connecting to the backend to get events"
            );
        }
        ListenerExit::EndOfStream => {
            info!(location = %adapter.location(), "Event streaming ended");
        }
        ListenerExit::ReceiveFailed(e) => {
            warn!(location = %adapter.location(), error = %e, "Event streaming ended with an error");
        }
        ListenerExit::EncodeFailed(e) => {
            error!(location = %adapter.location(), error = %e, "Error encoding event");
        }
        other => {
            debug!(location = %adapter.location(), exit = ?other, "Adapter listener stopped");
        }
    }

    adapter.close().await;
    metrics.record_listener_finished();
    exit
}

async fn drain_events(
    adapter: &LiveAdapter,
    buffer: &OutputBuffer,
    ctx: &ConnectionContext,
) -> ListenerExit {
    let subscription = tokio::select! {
        biased;
        _ = ctx.cancelled() => return ListenerExit::Cancelled,
        subscription = adapter.subscribe(ctx) => subscription,
    };
    let mut events = match subscription {
        Ok(events) => events,
        Err(e) => return ListenerExit::SubscribeFailed(e),
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancelled() => return ListenerExit::Cancelled,
            _ = adapter.wait_closed() => return ListenerExit::HandleClosed,
            next = events.next() => next,
        };

        let event = match next {
            None => return ListenerExit::EndOfStream,
            Some(Err(e)) => return ListenerExit::ReceiveFailed(e),
            Some(Ok(event)) => event,
        };

        debug!(location = %adapter.location(), "Received an event");
        let payload = match encode_event(adapter.location(), event) {
            Ok(payload) => payload,
            Err(e) => return ListenerExit::EncodeFailed(e.to_string()),
        };

        if buffer.push(payload).await.is_err() {
            return ListenerExit::BufferClosed;
        }
    }
}

/// Serialize an event, stamping the emitting location if the adapter did not.
pub fn encode_event(location: &str, mut event: AdapterEvent) -> Result<Bytes, serde_json::Error> {
    event.location.get_or_insert_with(|| location.to_string());
    serde_json::to_vec(&event).map(Bytes::from)
}
