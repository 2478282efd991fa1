//! Server-sent events transport over a streaming HTTP body.

use crate::domain::TransportError;
use crate::ports::{DisconnectSignal, OutboundTransport};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Outbound transport whose records become chunks of an HTTP response body.
///
/// The body holds the receiving end; when the HTTP server drops it (client
/// gone) writes fail and the disconnect signal fires.
pub struct SseTransport {
    tx: mpsc::Sender<Bytes>,
}

/// Create a transport and the response body it feeds.
pub fn sse_channel() -> (SseTransport, Body) {
    // One in-flight chunk: the relay waits for the server to take each record.
    let (tx, rx) = mpsc::channel(1);
    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (SseTransport { tx }, body)
}

/// Wrap an event-stream body with the server-push response headers.
pub fn event_stream_response(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

#[async_trait]
impl OutboundTransport for SseTransport {
    async fn write(&mut self, record: Bytes) -> Result<(), TransportError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        // Each record is its own body frame; nothing is held back here.
        if self.tx.is_closed() {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    fn disconnect_signal(&self) -> DisconnectSignal {
        let tx = self.tx.clone();
        Box::pin(async move { tx.closed().await })
    }
}
