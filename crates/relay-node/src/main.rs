//! # Mesh Relay Node
//!
//! Serves the adapter event stream over HTTP.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging, Prometheus registry)
//! 2. Load configuration (`RELAY_CONFIG` file, then environment)
//! 3. Wire the HTTP adapter client and the preference store
//! 4. Bind and serve until Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_node::{NodeConfig, RelayNode};
use relay_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(&TelemetryConfig::from_env())
        .context("failed to initialize telemetry")?;

    let config = NodeConfig::load().context("failed to load configuration")?;
    info!(
        port = config.streamer.http.port,
        events_path = %config.streamer.http.events_path,
        poll_interval = ?config.streamer.poll_interval,
        "Starting relay node"
    );

    let node = Arc::new(RelayNode::new(config).context("failed to build relay node")?);
    let listener = node.bind().await.context("failed to bind")?;

    let mut server = tokio::spawn({
        let node = Arc::clone(&node);
        async move { node.serve(listener).await }
    });

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            node.shutdown();
        }
        result = &mut server => {
            // Server stopped on its own; report why.
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("server failed"),
                Err(e) => Err(e).context("server task panicked"),
            };
        }
    }

    match server.await {
        Ok(Ok(())) => info!("Relay node stopped"),
        Ok(Err(e)) => error!(error = %e, "Server failed during shutdown"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }
    Ok(())
}
