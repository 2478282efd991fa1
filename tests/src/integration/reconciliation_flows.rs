//! # Reconciliation Flows
//!
//! Whole stream sessions driven by mock adapters and a recording transport,
//! with the clock paused so every reconciliation tick is deterministic.
//!
//! ## Flows Tested:
//!
//! 1. **Adapter flap**: healthy → unreachable → reachable re-announces once
//! 2. **Preference edits**: removed locations are closed, the rest keep relaying
//! 3. **Cluster access withdrawn**: the registry drains, the session keeps polling
//! 4. **Adapter stream ends**: the handle is closed, then recreated by reconciliation
//! 5. **Backpressure**: a saturated buffer blocks producers, nothing is lost

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::task::JoinHandle;
    use tokio::time::{timeout, Instant};

    use event_streamer::service::output_buffer;
    use event_streamer::test_utils::{
        MockAdapterFactory, RecordingTransport, StaticPreferenceSource, TransportProbe,
    };
    use event_streamer::{
        AdapterConfig, AdapterEvent, ClusterAccess, EventType, Preference, PreferenceSource,
        SessionReport, StreamMetrics, StreamSession, StreamerConfig,
    };

    const ISTIO: &str = "istio:10000";
    const LINKERD: &str = "linkerd:10001";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Harness {
        factory: MockAdapterFactory,
        source: Arc<StaticPreferenceSource>,
        metrics: Arc<StreamMetrics>,
        probe: TransportProbe,
        task: JoinHandle<SessionReport>,
    }

    impl Harness {
        fn start(locations: &[&str]) -> Self {
            let factory = MockAdapterFactory::new();
            let source = Arc::new(StaticPreferenceSource::with_adapters(
                ClusterAccess::in_cluster(),
                locations.iter().copied(),
            ));
            let metrics = Arc::new(StreamMetrics::new());
            let session = StreamSession::new(
                StreamerConfig::default(),
                Arc::new(factory.clone()),
                Arc::clone(&source) as Arc<dyn PreferenceSource>,
                Arc::clone(&metrics),
            );
            let (transport, probe) = RecordingTransport::new();
            let task = tokio::spawn(async move { session.run(transport).await });

            Self {
                factory,
                source,
                metrics,
                probe,
                task,
            }
        }

        async fn disconnect(self) -> (MockAdapterFactory, SessionReport) {
            self.probe.disconnect();
            let report = timeout(Duration::from_secs(5), self.task)
                .await
                .expect("session should end after disconnect")
                .expect("session task panicked");
            (self.factory, report)
        }
    }

    fn event(summary: &str) -> AdapterEvent {
        AdapterEvent::new(EventType::Info, summary)
    }

    fn summaries(probe: &TransportProbe) -> Vec<String> {
        probe.events().into_iter().map(|e| e.summary).collect()
    }

    /// Poll `condition` on the (paused) clock for up to a minute of virtual time.
    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(60);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    // =============================================================================
    // ADAPTER FLAP
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_adapter_is_recreated_and_announced_once() {
        let harness = Harness::start(&[ISTIO]);
        let factory = harness.factory.clone();

        assert!(wait_until(|| factory.open_streams(ISTIO) == 1).await);
        factory.emit(ISTIO, event("E1"));
        assert!(harness.probe.wait_for_records(1, Duration::from_secs(1)).await);

        // Goes away: the next probe fails and the handle is evicted.
        factory.set_healthy(ISTIO, false);
        factory.set_reachable(ISTIO, false);
        assert!(wait_until(|| factory.handles_at(ISTIO)[0].closes == 1).await);
        assert_eq!(factory.open_streams(ISTIO), 0);

        // The following tick tries again and fails to connect.
        assert!(wait_until(|| factory.connect_attempts(ISTIO) == 2).await);
        assert_eq!(factory.handles_at(ISTIO).len(), 1);

        // Back again: a fresh handle is created and announced.
        factory.set_reachable(ISTIO, true);
        factory.set_healthy(ISTIO, true);
        assert!(wait_until(|| factory.open_streams(ISTIO) == 1).await);
        factory.emit(ISTIO, event("E2"));
        assert!(harness.probe.wait_for_records(2, Duration::from_secs(1)).await);

        // Several more healthy ticks do not announce it again.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(factory.handles_at(ISTIO).len(), 2);
        assert_eq!(harness.metrics.announcements.load(Ordering::Relaxed), 2);
        assert_eq!(harness.metrics.connect_failures.load(Ordering::Relaxed), 1);
        assert_eq!(summaries(&harness.probe), vec!["E1", "E2"]);

        let (factory, report) = harness.disconnect().await;
        assert_eq!(report.announced, 2);
        assert_eq!(report.events_relayed, 2);
        assert!(factory.handles().iter().all(|h| h.closes == 1));
    }

    // =============================================================================
    // PREFERENCE EDITS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_removed_location_is_closed_while_others_keep_relaying() {
        let harness = Harness::start(&[ISTIO, LINKERD]);
        let factory = harness.factory.clone();
        assert!(wait_until(|| factory.open_streams(ISTIO) == 1 && factory.open_streams(LINKERD) == 1).await);

        harness.source.set(Preference::new(
            Some(ClusterAccess::in_cluster()),
            vec![AdapterConfig::new(LINKERD)],
        ));
        assert!(wait_until(|| factory.handles_at(ISTIO)[0].closes == 1).await);

        assert_eq!(factory.emit(ISTIO, event("dropped")), 0);
        assert_eq!(factory.emit(LINKERD, event("E1")), 1);
        assert!(harness.probe.wait_for_records(1, Duration::from_secs(1)).await);
        assert_eq!(summaries(&harness.probe), vec!["E1"]);
        assert_eq!(
            harness.probe.events()[0].location.as_deref(),
            Some(LINKERD)
        );
        assert_eq!(factory.handles_at(LINKERD)[0].closes, 0);

        let (factory, report) = harness.disconnect().await;
        assert_eq!(report.announced, 2);
        let handles = factory.handles();
        assert_eq!(handles.len(), 2);
        assert!(handles.iter().all(|h| h.closes == 1), "{handles:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawn_cluster_access_drains_but_session_continues() {
        let harness = Harness::start(&[ISTIO, LINKERD]);
        let factory = harness.factory.clone();
        assert!(wait_until(|| factory.open_streams(ISTIO) == 1 && factory.open_streams(LINKERD) == 1).await);

        harness
            .source
            .set(Preference::new(None, vec![AdapterConfig::new(ISTIO), AdapterConfig::new(LINKERD)]));
        assert!(wait_until(|| factory.handles().iter().all(|h| h.closes == 1)).await);

        // Steady state: nothing is reconnected while access stays absent.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!harness.task.is_finished());
        assert_eq!(factory.connect_attempts(ISTIO), 1);
        assert_eq!(factory.connect_attempts(LINKERD), 1);
        assert!(harness.probe.records().is_empty());

        // Access restored: both adapters come back.
        harness.source.set(Preference::new(
            Some(ClusterAccess::in_cluster()),
            vec![AdapterConfig::new(ISTIO), AdapterConfig::new(LINKERD)],
        ));
        assert!(wait_until(|| factory.open_streams(ISTIO) == 1 && factory.open_streams(LINKERD) == 1).await);

        let (factory, report) = harness.disconnect().await;
        assert_eq!(report.announced, 4);
        assert!(factory.handles().iter().all(|h| h.closes == 1));
    }

    // =============================================================================
    // ADAPTER STREAM ENDS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_ended_stream_closes_handle_and_reconnects() {
        let harness = Harness::start(&[ISTIO]);
        let factory = harness.factory.clone();
        assert!(wait_until(|| factory.open_streams(ISTIO) == 1).await);

        factory.end_streams(ISTIO);
        assert!(wait_until(|| factory.handles_at(ISTIO)[0].closes == 1).await);

        // Closed handle fails its next probe, and the tick after recreates it.
        assert!(wait_until(|| factory.handles_at(ISTIO).len() == 2 && factory.open_streams(ISTIO) == 1).await);
        factory.emit(ISTIO, event("after reconnect"));
        assert!(harness.probe.wait_for_records(1, Duration::from_secs(1)).await);

        let (factory, report) = harness.disconnect().await;
        assert_eq!(report.announced, 2);
        assert_eq!(report.listeners, 2);
        assert!(factory.handles().iter().all(|h| h.closes == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_adapter_order_is_preserved_across_interleaving() {
        let harness = Harness::start(&[ISTIO, LINKERD]);
        let factory = harness.factory.clone();
        assert!(wait_until(|| factory.open_streams(ISTIO) == 1 && factory.open_streams(LINKERD) == 1).await);

        for n in 0..20 {
            factory.emit(ISTIO, event(&format!("istio-{n}")));
            factory.emit(LINKERD, event(&format!("linkerd-{n}")));
        }
        assert!(harness.probe.wait_for_records(40, Duration::from_secs(5)).await);

        let events = harness.probe.events();
        for location in [ISTIO, LINKERD] {
            let prefix = location.split(':').next().unwrap_or_default();
            let seen: Vec<String> = events
                .iter()
                .filter(|e| e.location.as_deref() == Some(location))
                .map(|e| e.summary.clone())
                .collect();
            let expected: Vec<String> = (0..20).map(|n| format!("{prefix}-{n}")).collect();
            assert_eq!(seen, expected);
        }

        harness.disconnect().await;
    }

    // =============================================================================
    // BACKPRESSURE
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_saturated_buffer_blocks_producers_without_loss() {
        let (buffer, mut drain) = output_buffer(1);

        buffer.push(Bytes::from_static(b"first")).await.unwrap();
        assert_eq!(buffer.available(), 0);
        assert!(
            timeout(Duration::from_millis(50), buffer.push(Bytes::from_static(b"blocked")))
                .await
                .is_err(),
            "a full buffer must block, not drop"
        );
        assert_eq!(drain.next().await, Some(Bytes::from_static(b"first")));

        let producers: Vec<_> = (0..3)
            .map(|producer| {
                let buffer = buffer.clone();
                tokio::spawn(async move {
                    for n in 0..50 {
                        buffer
                            .push(Bytes::from(format!("{producer}:{n}")))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        drop(buffer);

        let mut received = Vec::new();
        while let Some(payload) = drain.next().await {
            received.push(String::from_utf8(payload.to_vec()).unwrap());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for producer in producers {
            producer.await.unwrap();
        }

        assert_eq!(received.len(), 150);
        for producer in 0..3 {
            let sequence: Vec<u32> = received
                .iter()
                .filter_map(|p| p.strip_prefix(&format!("{producer}:")).map(str::to_string))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(sequence, (0..50).collect::<Vec<u32>>());
        }
    }
}
