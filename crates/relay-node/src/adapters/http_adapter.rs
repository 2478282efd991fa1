//! Adapters reached over HTTP.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | connect   | `POST /v1/cluster` with the cluster access as JSON |
//! | probe     | `GET /v1/mesh-name` |
//! | subscribe | `GET /v1/events`, newline-delimited JSON events |
//!
//! Close is local: dropping the client side of an open event request ends
//! it, and there is no server-side session to release.

use crate::container::AdapterClientConfig;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use event_streamer::{
    AdapterError, AdapterEvent, AdapterFactory, AdapterHandle, ClusterAccess, ConnectionContext,
    EventStream,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use std::pin::Pin;
use tracing::debug;

/// Body of `POST /v1/cluster`.
#[derive(Debug, Serialize)]
struct ClusterRegistration<'a> {
    config: &'a str,
    context_name: &'a str,
    in_cluster: bool,
}

/// Factory producing [`HttpAdapter`]s that share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpAdapterFactory {
    client: reqwest::Client,
    default_scheme: String,
    max_event_bytes: usize,
}

impl HttpAdapterFactory {
    pub fn new(config: &AdapterClientConfig) -> reqwest::Result<Self> {
        // No overall request timeout: event requests stay open indefinitely.
        let client = reqwest::Client::builder()
            .connect_timeout(config.tcp_connect_timeout)
            .build()?;
        Ok(Self {
            client,
            default_scheme: config.default_scheme.clone(),
            max_event_bytes: config.max_event_bytes,
        })
    }

    /// Base URL for a location, keeping an explicit scheme if present.
    pub fn base_url(&self, location: &str) -> String {
        let location = location.trim_end_matches('/');
        if location.contains("://") {
            location.to_string()
        } else {
            format!("{}://{}", self.default_scheme, location)
        }
    }
}

#[async_trait]
impl AdapterFactory for HttpAdapterFactory {
    async fn connect(
        &self,
        _ctx: &ConnectionContext,
        access: &ClusterAccess,
        location: &str,
    ) -> Result<Box<dyn AdapterHandle>, AdapterError> {
        let base_url = self.base_url(location);
        let config = std::str::from_utf8(&access.config)
            .map_err(|e| AdapterError::connect(location, format!("kubeconfig is not valid UTF-8: {e}")))?;
        let registration = ClusterRegistration {
            config,
            context_name: &access.context_name,
            in_cluster: access.in_cluster,
        };

        self.client
            .post(format!("{base_url}/v1/cluster"))
            .json(&registration)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AdapterError::connect(location, e))?;

        debug!(location = %location, "Registered cluster access with adapter");
        Ok(Box::new(HttpAdapter {
            client: self.client.clone(),
            base_url,
            max_event_bytes: self.max_event_bytes,
        }))
    }
}

/// One HTTP adapter.
#[derive(Debug)]
pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
    max_event_bytes: usize,
}

#[async_trait]
impl AdapterHandle for HttpAdapter {
    async fn probe(&self, _ctx: &ConnectionContext) -> Result<(), AdapterError> {
        self.client
            .get(format!("{}/v1/mesh-name", self.base_url))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map(|_| ())
            .map_err(|e| AdapterError::Probe(e.to_string()))
    }

    async fn subscribe(&self, _ctx: &ConnectionContext) -> Result<EventStream, AdapterError> {
        let response = self
            .client
            .get(format!("{}/v1/events", self.base_url))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AdapterError::Subscribe(e.to_string()))?;

        Ok(ndjson_events(response.bytes_stream(), self.max_event_bytes))
    }

    async fn close(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

struct Decoder<S> {
    body: Pin<Box<S>>,
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    max_event_bytes: usize,
    done: bool,
}

/// Decode a newline-delimited JSON body into events.
///
/// Blank lines are skipped. A malformed line, a line longer than
/// `max_event_bytes`, or a body error ends the stream with an error item; a
/// final line without a trailing newline is decoded.
pub fn ndjson_events<S, E>(body: S, max_event_bytes: usize) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = Decoder {
        body: Box::pin(body),
        buffer: BytesMut::new(),
        scanned: 0,
        max_event_bytes,
        done: false,
    };

    futures::stream::unfold(decoder, |mut decoder| async move {
        if decoder.done {
            return None;
        }
        loop {
            let unscanned = &decoder.buffer[decoder.scanned..];
            if let Some(offset) = unscanned.iter().position(|b| *b == b'\n') {
                let newline = decoder.scanned + offset;
                decoder.scanned = 0;
                if newline > decoder.max_event_bytes {
                    decoder.done = true;
                    return Some((Err(oversized(decoder.max_event_bytes)), decoder));
                }
                let line = decoder.buffer.split_to(newline + 1);
                let line = line[..newline].trim_ascii();
                if line.is_empty() {
                    continue;
                }
                let item = decode_line(line);
                decoder.done = item.is_err();
                return Some((item, decoder));
            }

            decoder.scanned = decoder.buffer.len();
            if decoder.buffer.len() > decoder.max_event_bytes {
                decoder.done = true;
                decoder.buffer = BytesMut::new();
                return Some((Err(oversized(decoder.max_event_bytes)), decoder));
            }

            match decoder.body.next().await {
                Some(Ok(chunk)) => decoder.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    decoder.done = true;
                    return Some((Err(AdapterError::Receive(e.to_string())), decoder));
                }
                None => {
                    decoder.done = true;
                    let rest = decoder.buffer.split();
                    let line = rest.trim_ascii();
                    if line.is_empty() {
                        return None;
                    }
                    return Some((decode_line(line), decoder));
                }
            }
        }
    })
    .boxed()
}

fn oversized(max_event_bytes: usize) -> AdapterError {
    AdapterError::Receive(format!("event exceeds {max_event_bytes} bytes"))
}

fn decode_line(line: &[u8]) -> Result<AdapterEvent, AdapterError> {
    serde_json::from_slice(line).map_err(|e| AdapterError::Receive(format!("invalid event: {e}")))
}
