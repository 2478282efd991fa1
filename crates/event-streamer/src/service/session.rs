//! One streaming session per client connection.
//!
//! Wires the pipeline and supervises it:
//!
//! ```text
//! Reconciler ──announce──► ListenerSpawner ──► listeners ──► OutputBuffer ──► OutputRelay ──► transport
//!      ▲                                                                                        │
//!      └──────────────── ConnectionContext ◄──── supervisor ◄──── disconnect signal ◄──────────┘
//! ```
//!
//! Teardown happens once: the supervisor cancels the context, the reconciler
//! stops and closes the announcement channel and then the output buffer, and
//! everything downstream drains and ends on its own.

use super::buffer::output_buffer;
use super::listener::ListenerSpawner;
use super::reconciler::Reconciler;
use super::relay::OutputRelay;
use crate::domain::{ConnectionContext, StreamerConfig};
use crate::metrics::StreamMetrics;
use crate::ports::{AdapterFactory, DisconnectSignal, OutboundTransport, PreferenceSource};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Summary of a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub connection_id: Uuid,
    /// Adapters handed to listeners
    pub announced: usize,
    /// Listener tasks started
    pub listeners: usize,
    /// Records written to the transport
    pub events_relayed: u64,
    /// Session ended because the transport failed
    pub transport_failed: bool,
}

/// Streaming session factory. Cheap to clone, one `run` per connection.
#[derive(Clone)]
pub struct StreamSession {
    config: StreamerConfig,
    factory: Arc<dyn AdapterFactory>,
    preferences: Arc<dyn PreferenceSource>,
    metrics: Arc<StreamMetrics>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl StreamSession {
    pub fn new(
        config: StreamerConfig,
        factory: Arc<dyn AdapterFactory>,
        preferences: Arc<dyn PreferenceSource>,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            config,
            factory,
            preferences,
            metrics,
            shutdown: None,
        }
    }

    /// End sessions when `shutdown` turns true (server shutdown).
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    /// Stream events into `transport` until the client disconnects, the
    /// server shuts down, or the transport fails.
    pub async fn run<T: OutboundTransport>(&self, transport: T) -> SessionReport {
        let ctx = ConnectionContext::new();
        let metrics = Arc::clone(&self.metrics);
        metrics.record_session_opened();
        info!(connection_id = %ctx.id(), "Client connected to event stream");

        let disconnected = transport.disconnect_signal();
        let (buffer, drain) = output_buffer(self.config.output_buffer_capacity);
        let (announcer, announcements) = mpsc::unbounded_channel();

        let relay = tokio::spawn(
            OutputRelay::new(drain, transport, ctx.clone(), Arc::clone(&metrics)).run(),
        );
        let spawner = tokio::spawn(
            ListenerSpawner::new(announcements, buffer.clone(), ctx.clone(), Arc::clone(&metrics))
                .run(),
        );
        let supervisor = tokio::spawn(supervise(ctx.clone(), disconnected, self.shutdown.clone()));

        let reconciler = Reconciler::new(
            Arc::clone(&self.factory),
            Arc::clone(&self.preferences),
            &self.config,
            Arc::clone(&metrics),
        );
        let announced = reconciler.run(&ctx, announcer, buffer).await;

        if let Err(e) = supervisor.await {
            error!(connection_id = %ctx.id(), error = %e, "Connection supervisor failed");
        }
        let listeners = spawner.await.unwrap_or_else(|e| {
            error!(connection_id = %ctx.id(), error = %e, "Listener spawner failed");
            0
        });
        let outcome = relay.await.unwrap_or_else(|e| {
            error!(connection_id = %ctx.id(), error = %e, "Output relay failed");
            Default::default()
        });

        // Handles still registered whose listener never closed them.
        for adapter in reconciler.registry().drain() {
            adapter.close().await;
        }

        metrics.record_session_closed();
        let report = SessionReport {
            connection_id: ctx.id(),
            announced,
            listeners,
            events_relayed: outcome.relayed,
            transport_failed: outcome.transport_error.is_some(),
        };
        info!(
            connection_id = %report.connection_id,
            announced = report.announced,
            events_relayed = report.events_relayed,
            transport_failed = report.transport_failed,
            "Event stream closed"
        );
        report
    }
}

/// Cancel `ctx` on the first of: client disconnect, server shutdown, or
/// cancellation from inside the pipeline.
async fn supervise(
    ctx: ConnectionContext,
    disconnected: DisconnectSignal,
    shutdown: Option<watch::Receiver<bool>>,
) {
    tokio::select! {
        _ = disconnected => {
            info!(connection_id = %ctx.id(), "Client disconnected");
        }
        _ = server_shutdown(shutdown) => {
            info!(connection_id = %ctx.id(), "Server shutting down, closing event stream");
        }
        _ = ctx.cancelled() => {
            debug!(connection_id = %ctx.id(), "Connection cancelled from within the pipeline");
        }
    }
    ctx.cancel();
}

async fn server_shutdown(shutdown: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = shutdown else {
        return futures::future::pending().await;
    };
    let sender_gone = rx.wait_for(|shutdown| *shutdown).await.is_err();
    if sender_gone {
        futures::future::pending::<()>().await;
    }
}
