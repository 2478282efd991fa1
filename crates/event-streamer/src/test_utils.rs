//! In-memory collaborators for deterministic testing.
//!
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```ignore
//! use event_streamer::test_utils::StaticPreferenceSource;
//! use event_streamer::{ClusterAccess, PreferenceSource};
//!
//! let source = StaticPreferenceSource::with_adapters(ClusterAccess::in_cluster(), ["istio:10000"]);
//! assert_eq!(source.current().adapter_locations(), vec!["istio:10000"]);
//! ```

use crate::domain::{
    AdapterConfig, AdapterError, AdapterEvent, ClusterAccess, ConnectionContext, Preference,
    TransportError,
};
use crate::ports::{
    AdapterFactory, AdapterHandle, DisconnectSignal, EventStream, OutboundTransport,
    PreferenceSource,
};
use crate::service::relay::{RECORD_PREFIX, RECORD_TERMINATOR};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

// =============================================================================
// PREFERENCES
// =============================================================================

/// Preference source returning whatever was last `set`.
#[derive(Debug, Default)]
pub struct StaticPreferenceSource {
    preference: Mutex<Preference>,
}

impl StaticPreferenceSource {
    pub fn new(preference: Preference) -> Self {
        Self {
            preference: Mutex::new(preference),
        }
    }

    pub fn with_adapters<I, S>(access: ClusterAccess, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Preference::new(
            Some(access),
            locations.into_iter().map(AdapterConfig::new).collect(),
        ))
    }

    pub fn set(&self, preference: Preference) {
        *self.preference.lock() = preference;
    }
}

impl PreferenceSource for StaticPreferenceSource {
    fn current(&self) -> Preference {
        self.preference.lock().clone()
    }
}

// =============================================================================
// ADAPTERS
// =============================================================================

/// Scripted behaviour of one adapter location.
#[derive(Debug, Clone)]
pub struct MockBehaviour {
    /// `connect` succeeds
    pub reachable: bool,
    /// `probe` succeeds
    pub healthy: bool,
    /// `subscribe` succeeds
    pub subscribable: bool,
    /// Events delivered as soon as a subscription opens
    pub initial_events: Vec<AdapterEvent>,
    /// End the stream right after `initial_events`
    pub end_after_initial: bool,
}

impl Default for MockBehaviour {
    fn default() -> Self {
        Self {
            reachable: true,
            healthy: true,
            subscribable: true,
            initial_events: Vec::new(),
            end_after_initial: false,
        }
    }
}

/// Statistics of one handle created by [`MockAdapterFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandleStats {
    pub id: u64,
    pub location: String,
    pub probes: usize,
    pub subscriptions: usize,
    pub closes: usize,
}

#[derive(Default)]
struct HandleCounters {
    probes: AtomicUsize,
    subscriptions: AtomicUsize,
    closes: AtomicUsize,
}

type EventSender = mpsc::UnboundedSender<Result<AdapterEvent, AdapterError>>;

#[derive(Default)]
struct MockState {
    behaviours: HashMap<String, MockBehaviour>,
    connect_attempts: HashMap<String, usize>,
    handles: Vec<(u64, String, Arc<HandleCounters>)>,
    streams: HashMap<u64, (String, EventSender)>,
    next_id: u64,
}

impl MockState {
    fn behaviour(&self, location: &str) -> MockBehaviour {
        self.behaviours.get(location).cloned().unwrap_or_default()
    }
}

/// Adapter factory whose adapters are driven from the test.
#[derive(Clone, Default)]
pub struct MockAdapterFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behaviour(&self, location: &str, behaviour: MockBehaviour) {
        self.state
            .lock()
            .behaviours
            .insert(location.to_string(), behaviour);
    }

    pub fn set_reachable(&self, location: &str, reachable: bool) {
        let mut state = self.state.lock();
        let mut behaviour = state.behaviour(location);
        behaviour.reachable = reachable;
        state.behaviours.insert(location.to_string(), behaviour);
    }

    pub fn set_healthy(&self, location: &str, healthy: bool) {
        let mut state = self.state.lock();
        let mut behaviour = state.behaviour(location);
        behaviour.healthy = healthy;
        state.behaviours.insert(location.to_string(), behaviour);
    }

    /// Push an event into every open subscription at `location`.
    /// Returns the number of subscriptions that accepted it.
    pub fn emit(&self, location: &str, event: AdapterEvent) -> usize {
        self.send(location, Ok(event))
    }

    /// Break every open subscription at `location` with `error`.
    pub fn fail_streams(&self, location: &str, error: AdapterError) -> usize {
        let sent = self.send(location, Err(error));
        self.end_streams(location);
        sent
    }

    /// Gracefully end every open subscription at `location`.
    pub fn end_streams(&self, location: &str) {
        self.state
            .lock()
            .streams
            .retain(|_, (stream_location, _)| stream_location != location);
    }

    pub fn open_streams(&self, location: &str) -> usize {
        self.state
            .lock()
            .streams
            .values()
            .filter(|(stream_location, _)| stream_location == location)
            .count()
    }

    pub fn connect_attempts(&self, location: &str) -> usize {
        self.state
            .lock()
            .connect_attempts
            .get(location)
            .copied()
            .unwrap_or(0)
    }

    /// Stats for every handle ever created, in creation order.
    pub fn handles(&self) -> Vec<MockHandleStats> {
        self.state
            .lock()
            .handles
            .iter()
            .map(|(id, location, counters)| MockHandleStats {
                id: *id,
                location: location.clone(),
                probes: counters.probes.load(Ordering::SeqCst),
                subscriptions: counters.subscriptions.load(Ordering::SeqCst),
                closes: counters.closes.load(Ordering::SeqCst),
            })
            .collect()
    }

    pub fn handles_at(&self, location: &str) -> Vec<MockHandleStats> {
        self.handles()
            .into_iter()
            .filter(|stats| stats.location == location)
            .collect()
    }

    fn send(&self, location: &str, item: Result<AdapterEvent, AdapterError>) -> usize {
        self.state
            .lock()
            .streams
            .values()
            .filter(|(stream_location, _)| stream_location == location)
            .filter(|(_, tx)| tx.send(item.clone()).is_ok())
            .count()
    }
}

#[async_trait]
impl AdapterFactory for MockAdapterFactory {
    async fn connect(
        &self,
        _ctx: &ConnectionContext,
        _access: &ClusterAccess,
        location: &str,
    ) -> Result<Box<dyn AdapterHandle>, AdapterError> {
        let mut state = self.state.lock();
        *state
            .connect_attempts
            .entry(location.to_string())
            .or_default() += 1;

        if !state.behaviour(location).reachable {
            return Err(AdapterError::connect(location, "connection refused"));
        }

        state.next_id += 1;
        let id = state.next_id;
        let counters = Arc::new(HandleCounters::default());
        state
            .handles
            .push((id, location.to_string(), Arc::clone(&counters)));

        Ok(Box::new(MockAdapter {
            id,
            location: location.to_string(),
            counters,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Handle produced by [`MockAdapterFactory`].
pub struct MockAdapter {
    id: u64,
    location: String,
    counters: Arc<HandleCounters>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl AdapterHandle for MockAdapter {
    async fn probe(&self, _ctx: &ConnectionContext) -> Result<(), AdapterError> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().behaviour(&self.location).healthy {
            Ok(())
        } else {
            Err(AdapterError::Probe(format!("{} unreachable", self.location)))
        }
    }

    async fn subscribe(&self, _ctx: &ConnectionContext) -> Result<EventStream, AdapterError> {
        self.counters.subscriptions.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let behaviour = state.behaviour(&self.location);
        if !behaviour.subscribable {
            return Err(AdapterError::Subscribe("events not supported".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in behaviour.initial_events {
            let _ = tx.send(Ok(event));
        }
        if !behaviour.end_after_initial {
            state.streams.insert(self.id, (self.location.clone(), tx));
        }

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.state.lock().streams.remove(&self.id);
        Ok(())
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[derive(Default)]
struct TransportState {
    records: Vec<Bytes>,
    flushes: usize,
    fail_writes: bool,
}

/// Transport that records every framed write.
pub struct RecordingTransport {
    state: Arc<Mutex<TransportState>>,
    disconnected: watch::Receiver<bool>,
}

/// Test-side view and control of a [`RecordingTransport`].
#[derive(Clone)]
pub struct TransportProbe {
    state: Arc<Mutex<TransportState>>,
    disconnect_tx: Arc<watch::Sender<bool>>,
}

impl RecordingTransport {
    pub fn new() -> (Self, TransportProbe) {
        let state = Arc::new(Mutex::new(TransportState::default()));
        let (disconnect_tx, disconnected) = watch::channel(false);
        (
            Self {
                state: Arc::clone(&state),
                disconnected,
            },
            TransportProbe {
                state,
                disconnect_tx: Arc::new(disconnect_tx),
            },
        )
    }
}

#[async_trait]
impl OutboundTransport for RecordingTransport {
    async fn write(&mut self, record: Bytes) -> Result<(), TransportError> {
        if *self.disconnected.borrow() {
            return Err(TransportError::Disconnected);
        }
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(TransportError::Write("broken pipe".into()));
        }
        state.records.push(record);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.state.lock().flushes += 1;
        Ok(())
    }

    fn disconnect_signal(&self) -> DisconnectSignal {
        let mut rx = self.disconnected.clone();
        Box::pin(async move {
            let _ = rx.wait_for(|disconnected| *disconnected).await;
        })
    }
}

impl TransportProbe {
    /// Raw framed records, in write order.
    pub fn records(&self) -> Vec<Bytes> {
        self.state.lock().records.clone()
    }

    /// Record payloads with the framing stripped.
    pub fn payloads(&self) -> Vec<String> {
        self.records()
            .iter()
            .filter_map(|record| {
                record
                    .strip_prefix(RECORD_PREFIX)
                    .and_then(|rest| rest.strip_suffix(RECORD_TERMINATOR))
                    .map(|payload| String::from_utf8_lossy(payload).into_owned())
            })
            .collect()
    }

    /// Payloads decoded back into events.
    pub fn events(&self) -> Vec<AdapterEvent> {
        self.payloads()
            .iter()
            .filter_map(|payload| serde_json::from_str(payload).ok())
            .collect()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().flushes
    }

    /// Make every following write fail.
    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Fire the disconnect signal.
    pub fn disconnect(&self) {
        self.disconnect_tx.send_replace(true);
    }

    /// Wait until at least `count` records were written, or `limit` elapses.
    pub async fn wait_for_records(&self, count: usize, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.state.lock().records.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.state.lock().records.len() >= count
    }
}
