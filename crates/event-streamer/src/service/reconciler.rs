//! Reconciliation loop.
//!
//! Polls the preference source on a fixed interval and aligns the adapter
//! registry with it: connect what is configured and missing, probe what is
//! registered, evict what is dead or no longer configured, and announce
//! every freshly connected adapter exactly once.

use super::buffer::OutputBuffer;
use super::live_adapter::LiveAdapter;
use super::registry::AdapterRegistry;
use crate::domain::{AdapterError, ClusterAccess, ConnectionContext, StreamerConfig};
use crate::metrics::StreamMetrics;
use crate::ports::{AdapterFactory, PreferenceSource};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Sending half of the announcement channel.
pub type Announcer = mpsc::UnboundedSender<Arc<LiveAdapter>>;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// New handles inserted into the registry
    pub connected: usize,
    /// Handles handed to the listener spawner
    pub announced: usize,
    /// Handles closed and removed (probe failure, unconfigured, no access)
    pub evicted: usize,
    /// Failed or timed-out connection attempts
    pub connect_failures: usize,
}

/// Outcome of reconciling a single location.
enum Step {
    Kept,
    Announced,
    Evicted,
    ConnectFailed,
    Cancelled,
}

pub struct Reconciler {
    factory: Arc<dyn AdapterFactory>,
    preferences: Arc<dyn PreferenceSource>,
    registry: Arc<AdapterRegistry>,
    poll_interval: Duration,
    connect_timeout: Duration,
    probe_timeout: Duration,
    metrics: Arc<StreamMetrics>,
}

impl Reconciler {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        preferences: Arc<dyn PreferenceSource>,
        config: &StreamerConfig,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            factory,
            preferences,
            registry: Arc::new(AdapterRegistry::new()),
            poll_interval: config.poll_interval,
            connect_timeout: config.connect_timeout,
            probe_timeout: config.probe_timeout,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Tick until `ctx` is cancelled, then close the announcement channel
    /// and the output buffer, in that order.
    ///
    /// Returns the number of adapters announced over the whole run.
    pub async fn run(
        &self,
        ctx: &ConnectionContext,
        announcer: Announcer,
        buffer: OutputBuffer,
    ) -> usize {
        info!(
            connection_id = %ctx.id(),
            interval = ?self.poll_interval,
            "Starting adapter reconciliation"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut announced = 0;

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {}
            }
            announced += self.tick(ctx, &announcer).await.announced;
        }

        debug!(connection_id = %ctx.id(), "Reconciliation stopped, closing channels");
        drop(announcer);
        buffer.close();
        announced
    }

    /// One reconciliation pass.
    pub async fn tick(&self, ctx: &ConnectionContext, announcer: &Announcer) -> TickReport {
        let mut report = TickReport::default();
        let preference = self.preferences.current();
        let locations = preference.adapter_locations();

        let access = match preference.usable_cluster_access() {
            Some(access) if !locations.is_empty() => access,
            _ => {
                debug!(connection_id = %ctx.id(), "No valid cluster access or adapters configured");
                report.evicted = self.close_all(self.registry.drain()).await;
                return report;
            }
        };

        let configured: HashSet<&str> = locations.iter().copied().collect();
        let stale = self.registry.evict_unconfigured(&configured);
        if !stale.is_empty() {
            info!(count = stale.len(), "Evicting adapters that are no longer configured");
        }
        report.evicted = self.close_all(stale).await;

        for location in locations {
            if ctx.is_cancelled() {
                break;
            }
            match self.reconcile_location(ctx, access, location, announcer, &mut report).await {
                Step::Kept | Step::Announced => {}
                Step::Evicted => report.evicted += 1,
                Step::ConnectFailed => report.connect_failures += 1,
                Step::Cancelled => break,
            }
        }
        report
    }

    async fn reconcile_location(
        &self,
        ctx: &ConnectionContext,
        access: &ClusterAccess,
        location: &str,
        announcer: &Announcer,
        report: &mut TickReport,
    ) -> Step {
        let (adapter, fresh) = match self.registry.get(location) {
            Some(adapter) => (adapter, false),
            None => {
                let connect = self.factory.connect(ctx, access, location);
                match bounded(ctx, "connect", self.connect_timeout, connect).await {
                    Ok(handle) => {
                        let adapter = LiveAdapter::new(location, handle);
                        if let Err(rejected) = self.registry.try_insert(Arc::clone(&adapter)) {
                            rejected.close().await;
                            return Step::Kept;
                        }
                        debug!(location = %location, "Created new adapter connection");
                        self.metrics.record_connected();
                        report.connected += 1;
                        (adapter, true)
                    }
                    Err(AdapterError::Cancelled) => return Step::Cancelled,
                    Err(e) => {
                        warn!(location = %location, error = %e, "Error creating adapter connection");
                        self.metrics.record_connect_failure();
                        return Step::ConnectFailed;
                    }
                }
            }
        };

        match bounded(ctx, "probe", self.probe_timeout, adapter.probe(ctx)).await {
            Ok(()) => {}
            Err(AdapterError::Cancelled) => return Step::Cancelled,
            Err(e) => {
                warn!(location = %location, error = %e, "Adapter health check failed, evicting");
                self.metrics.record_probe_failure();
                self.registry.remove_if_same(&adapter);
                adapter.close().await;
                return Step::Evicted;
            }
        }

        if !fresh {
            return Step::Kept;
        }

        if announcer.send(Arc::clone(&adapter)).is_err() {
            debug!(location = %location, "Listener spawner gone, dropping new adapter");
            self.registry.remove_if_same(&adapter);
            adapter.close().await;
            return Step::Kept;
        }
        self.metrics.record_announcement();
        report.announced += 1;
        Step::Announced
    }

    async fn close_all(&self, adapters: Vec<Arc<LiveAdapter>>) -> usize {
        let count = adapters.len();
        for adapter in adapters {
            adapter.close().await;
        }
        self.metrics.record_evictions(count);
        count
    }
}

/// Run a collaborator call bounded by `limit` and by cancellation of `ctx`.
async fn bounded<T>(
    ctx: &ConnectionContext,
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, AdapterError>>,
) -> Result<T, AdapterError> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(AdapterError::Cancelled),
        result = tokio::time::timeout(limit, call) => match result {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout { operation, timeout: limit }),
        },
    }
}
