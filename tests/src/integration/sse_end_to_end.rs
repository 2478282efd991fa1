//! # Server-Sent Events End to End
//!
//! Real sockets on both sides of the relay:
//!
//! 1. **HTTP client → event stream service**: headers, framing, order
//! 2. **Client disconnect**: the session ends and every adapter is closed
//! 3. **Server shutdown**: open event streams end, the server stops
//! 4. **Relay node → HTTP adapter**: preference file, adapter registration,
//!    newline-delimited events relayed as SSE records, Prometheus scrape

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use bytes::Bytes;
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use event_streamer::test_utils::{MockAdapterFactory, MockBehaviour, StaticPreferenceSource};
    use event_streamer::{
        AdapterEvent, ClusterAccess, EventStreamService, EventType, StreamerConfig, StreamerError,
    };
    use relay_node::{NodeConfig, RelayNode};

    const ISTIO: &str = "istio:10000";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Splits an SSE body into `data:` payloads.
    struct SseReader {
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        pending: Vec<u8>,
    }

    impl SseReader {
        fn new(response: reqwest::Response) -> Self {
            Self {
                body: response.bytes_stream().boxed(),
                pending: Vec::new(),
            }
        }

        /// Next record payload, `None` once the body ends.
        async fn next_record(&mut self) -> Option<String> {
            loop {
                if let Some(end) = self.pending.windows(2).position(|w| w == b"\n\n") {
                    let record: Vec<u8> = self.pending.drain(..end + 2).collect();
                    let record = String::from_utf8(record).expect("utf-8 record");
                    let payload = record
                        .strip_prefix("data: ")
                        .expect("record starts with the data prefix")
                        .trim_end_matches('\n');
                    return Some(payload.to_string());
                }
                match self.body.next().await? {
                    Ok(chunk) => self.pending.extend_from_slice(&chunk),
                    Err(_) => return None,
                }
            }
        }

        async fn next_event(&mut self) -> AdapterEvent {
            let payload = timeout(Duration::from_secs(10), self.next_record())
                .await
                .expect("record within time")
                .expect("stream still open");
            serde_json::from_str(&payload).expect("payload is an event")
        }
    }

    fn event(summary: &str) -> AdapterEvent {
        AdapterEvent::new(EventType::Info, summary)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    async fn serve_streamer(
        factory: &MockAdapterFactory,
    ) -> (
        Arc<EventStreamService>,
        SocketAddr,
        JoinHandle<Result<(), StreamerError>>,
    ) {
        let service = Arc::new(
            EventStreamService::new(
                StreamerConfig::default(),
                Arc::new(factory.clone()),
                Arc::new(StaticPreferenceSource::with_adapters(
                    ClusterAccess::in_cluster(),
                    [ISTIO],
                )),
            )
            .unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.serve(listener, service.router()).await })
        };
        (service, addr, server)
    }

    // =============================================================================
    // EVENT STREAM SERVICE
    // =============================================================================

    #[tokio::test]
    async fn test_http_client_receives_framed_events_in_order() {
        let factory = MockAdapterFactory::new();
        factory.set_behaviour(
            ISTIO,
            MockBehaviour {
                initial_events: vec![event("E1"), event("E2"), event("E3")],
                ..MockBehaviour::default()
            },
        );
        let (service, addr, _server) = serve_streamer(&factory).await;

        let response = reqwest::Client::new()
            .get(format!("http://{addr}/api/events"))
            .header("Origin", "http://localhost:3000")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["content-type"], "text/event-stream");
        assert_eq!(headers["cache-control"], "no-cache");
        assert_eq!(headers["access-control-allow-origin"], "*");

        let mut reader = SseReader::new(response);
        let mut summaries = Vec::new();
        for _ in 0..3 {
            let event = reader.next_event().await;
            assert_eq!(event.location.as_deref(), Some(ISTIO));
            summaries.push(event.summary);
        }
        assert_eq!(summaries, vec!["E1", "E2", "E3"]);

        // Live events keep flowing on the same response.
        assert_eq!(factory.emit(ISTIO, event("E4")), 1);
        assert_eq!(reader.next_event().await.summary, "E4");
        let metrics = service.metrics();
        assert!(wait_until(|| metrics.events_relayed.load(Ordering::Relaxed) == 4).await);
    }

    #[tokio::test]
    async fn test_client_disconnect_closes_adapters() {
        let factory = MockAdapterFactory::new();
        factory.set_behaviour(
            ISTIO,
            MockBehaviour {
                initial_events: vec![event("E1")],
                ..MockBehaviour::default()
            },
        );
        let (service, addr, _server) = serve_streamer(&factory).await;
        let metrics = service.metrics();

        let response = reqwest::Client::new()
            .get(format!("http://{addr}/api/events"))
            .send()
            .await
            .unwrap();
        let mut reader = SseReader::new(response);
        assert_eq!(reader.next_event().await.summary, "E1");
        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 1);

        drop(reader);

        assert!(wait_until(|| metrics.sessions_active.load(Ordering::Relaxed) == 0).await);
        let handles = factory.handles_at(ISTIO);
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].closes, 1);
        assert_eq!(factory.open_streams(ISTIO), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_open_streams_and_server() {
        let factory = MockAdapterFactory::new();
        factory.set_behaviour(
            ISTIO,
            MockBehaviour {
                initial_events: vec![event("E1")],
                ..MockBehaviour::default()
            },
        );
        let (service, addr, server) = serve_streamer(&factory).await;

        let response = reqwest::Client::new()
            .get(format!("http://{addr}/api/events"))
            .send()
            .await
            .unwrap();
        let mut reader = SseReader::new(response);
        assert_eq!(reader.next_event().await.summary, "E1");

        service.shutdown();

        let end = timeout(Duration::from_secs(10), reader.next_record())
            .await
            .expect("stream should end after shutdown");
        assert!(end.is_none());
        timeout(Duration::from_secs(10), server)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
        assert!(factory.handles().iter().all(|h| h.closes == 1));
    }

    // =============================================================================
    // RELAY NODE WITH HTTP ADAPTERS
    // =============================================================================

    /// An adapter speaking the HTTP adapter protocol whose event stream stays
    /// open after its initial events.
    async fn serve_fake_adapter() -> SocketAddr {
        let router = Router::new()
            .route(
                "/v1/cluster",
                post(|Json(_): Json<serde_json::Value>| async { Json(serde_json::json!({})) }),
            )
            .route("/v1/mesh-name", get(|| async { "istio" }))
            .route(
                "/v1/events",
                get(|| async {
                    let lines = futures::stream::iter(vec![
                        Ok::<_, Infallible>(Bytes::from_static(
                            b"{\"event_type\":\"info\",\"summary\":\"deployed\"}\n",
                        )),
                        Ok(Bytes::from_static(
                            b"{\"event_type\":\"error\",\"summary\":\"failed\",\"details\":\"crd missing\"}\n",
                        )),
                    ])
                    .chain(futures::stream::pending());
                    Body::from_stream(lines)
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        addr
    }

    #[tokio::test]
    async fn test_relay_node_streams_http_adapter_events() {
        relay_telemetry::register_metrics().unwrap();
        let adapter_addr = serve_fake_adapter().await;
        let location = adapter_addr.to_string();

        let dir = tempfile::tempdir().unwrap();
        let preferences_path = dir.path().join("preferences.json");
        std::fs::write(
            &preferences_path,
            serde_json::json!({
                "k8s_config": { "in_cluster": true },
                "mesh_adapters": [{ "location": location }]
            })
            .to_string(),
        )
        .unwrap();

        let node = Arc::new(
            RelayNode::new(NodeConfig {
                preferences_path,
                ..NodeConfig::default()
            })
            .unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.serve(listener).await })
        };

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{addr}/api/events"))
            .send()
            .await
            .unwrap();
        let mut reader = SseReader::new(response);

        let first = reader.next_event().await;
        assert_eq!(first.summary, "deployed");
        assert_eq!(first.location.as_deref(), Some(location.as_str()));
        let second = reader.next_event().await;
        assert_eq!(second.event_type, EventType::Error);
        assert_eq!(second.details, "crd missing");

        let metrics = node.metrics();
        assert!(wait_until(|| metrics.events_relayed.load(Ordering::Relaxed) == 2).await);
        let scrape = client
            .get(format!("http://{addr}/metrics/prometheus"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(scrape.contains("relay_stream_metric{name=\"events_relayed\"} 2"), "{scrape}");
        assert!(scrape.contains("relay_stream_metric{name=\"sessions_active\"} 1"), "{scrape}");

        let json: serde_json::Value = client
            .get(format!("http://{addr}/metrics"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(json["announcements"], 1);

        node.shutdown();
        assert!(timeout(Duration::from_secs(10), reader.next_record())
            .await
            .expect("stream should end after shutdown")
            .is_none());
        timeout(Duration::from_secs(10), server)
            .await
            .expect("node should stop")
            .unwrap()
            .unwrap();
    }
}
