//! # Relay Node
//!
//! Holds the event stream service built from [`NodeConfig`] and serves it
//! together with the Prometheus endpoint.

use super::config::NodeConfig;
use crate::adapters::{FilePreferenceStore, HttpAdapterFactory};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use event_streamer::{
    AdapterFactory, EventStreamService, PreferenceSource, StreamMetrics, StreamerError,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// The running node.
pub struct RelayNode {
    config: NodeConfig,
    service: EventStreamService,
}

impl RelayNode {
    /// Wire the HTTP adapter client and the file preference store.
    pub fn new(config: NodeConfig) -> Result<Self, StreamerError> {
        let factory = HttpAdapterFactory::new(&config.adapter_client)
            .map_err(|e| StreamerError::Config(format!("adapter client: {e}")))?;
        let preferences = FilePreferenceStore::new(&config.preferences_path);
        Self::with_collaborators(config, Arc::new(factory), Arc::new(preferences))
    }

    /// Wire arbitrary collaborators (tests, embedding).
    pub fn with_collaborators(
        config: NodeConfig,
        factory: Arc<dyn AdapterFactory>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Result<Self, StreamerError> {
        let service = EventStreamService::new(config.streamer.clone(), factory, preferences)?;
        Ok(Self { config, service })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        self.service.metrics()
    }

    /// Streamer routes plus `GET /metrics/prometheus`.
    pub fn router(&self) -> Router {
        let prometheus = Router::new()
            .route("/metrics/prometheus", get(prometheus_metrics))
            .with_state(self.service.metrics());
        self.service.router().merge(prometheus)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, StreamerError> {
        let addr = self.config.streamer.http_addr();
        TcpListener::bind(addr)
            .await
            .map_err(|e| StreamerError::Bind(format!("{addr}: {e}")))
    }

    /// Serve until [`Self::shutdown`].
    pub async fn serve(&self, listener: TcpListener) -> Result<(), StreamerError> {
        info!(
            preferences = %self.config.preferences_path.display(),
            "Serving adapter events"
        );
        self.service.serve(listener, self.router()).await
    }

    /// Trigger graceful shutdown: open event streams end, then the server.
    pub fn shutdown(&self) {
        info!("Shutting down relay node");
        self.service.shutdown();
    }
}

async fn prometheus_metrics(State(metrics): State<Arc<StreamMetrics>>) -> impl IntoResponse {
    relay_telemetry::export_stream_metrics(metrics.snapshot());
    match relay_telemetry::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
