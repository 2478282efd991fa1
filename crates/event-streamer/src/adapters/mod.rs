//! Inbound/outbound adapters owned by the streamer itself.

pub mod sse;

pub use sse::{event_stream_response, sse_channel, SseTransport};
