//! Event stream service: HTTP surface and lifecycle.
//!
//! One long-lived `GET <events_path>` request per client; every request runs
//! its own [`StreamSession`] in a background task while the response body
//! streams the records it produces.

use crate::adapters::{event_stream_response, sse_channel};
use crate::domain::{StreamerConfig, StreamerError};
use crate::metrics::StreamMetrics;
use crate::ports::{AdapterFactory, PreferenceSource};
use crate::service::StreamSession;
use axum::{
    extract::State,
    http::Method,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Event stream service state
pub struct EventStreamService {
    config: StreamerConfig,
    session: StreamSession,
    metrics: Arc<StreamMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl EventStreamService {
    /// Create a new service; fails on invalid configuration.
    pub fn new(
        config: StreamerConfig,
        factory: Arc<dyn AdapterFactory>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Result<Self, StreamerError> {
        config
            .validate()
            .map_err(|e| StreamerError::Config(e.to_string()))?;

        let metrics = Arc::new(StreamMetrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = StreamSession::new(config.clone(), factory, preferences, Arc::clone(&metrics))
            .with_shutdown(shutdown_rx);

        Ok(Self {
            config,
            session,
            metrics,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Build the router: event stream, health and metrics.
    pub fn router(&self) -> Router {
        let state = AppState {
            session: self.session.clone(),
            metrics: Arc::clone(&self.metrics),
        };

        let router = Router::new()
            .route(&self.config.http.events_path, get(stream_events))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_json))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        if self.config.http.cors_allow_any_origin {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET]),
            )
        } else {
            router
        }
    }

    /// Bind the configured address and serve [`Self::router`] until shutdown.
    pub async fn start(&self) -> Result<(), StreamerError> {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StreamerError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener, self.router()).await
    }

    /// Serve `router` on `listener` until [`Self::shutdown`] is called.
    ///
    /// Open event streams are ended by the same signal, so graceful shutdown
    /// does not wait on clients that never hang up.
    pub async fn serve(&self, listener: TcpListener, router: Router) -> Result<(), StreamerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| StreamerError::Bind(e.to_string()))?;
        info!(addr = %addr, path = %self.config.http.events_path, "Starting event stream server");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|shutdown| *shutdown).await;
            })
            .await
            .map_err(|e| StreamerError::Serve(e.to_string()))?;

        info!("Event stream server stopped");
        Ok(())
    }

    /// Trigger graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    session: StreamSession,
    metrics: Arc<StreamMetrics>,
}

async fn stream_events(State(state): State<AppState>) -> Response {
    let (transport, body) = sse_channel();
    tokio::spawn(async move {
        state.session.run(transport).await;
    });
    event_stream_response(body)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}
