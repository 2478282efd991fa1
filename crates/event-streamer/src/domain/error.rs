//! Error types for the event streamer.
//!
//! None of these ever reach the client as a payload: per-adapter errors end
//! that adapter's participation, transport errors end the session.

use std::time::Duration;

/// Errors raised by adapter collaborators or by the handle wrapper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// Connection could not be established
    #[error("failed to connect to adapter at {location}: {reason}")]
    Connect { location: String, reason: String },

    /// Liveness probe failed
    #[error("health check failed: {0}")]
    Probe(String),

    /// Event subscription could not be opened
    #[error("failed to open event subscription: {0}")]
    Subscribe(String),

    /// Event stream broke mid-flight
    #[error("event stream failed: {0}")]
    Receive(String),

    /// Handle was already closed
    #[error("adapter handle already closed")]
    Closed,

    /// Collaborator call exceeded its bound
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Connection context was cancelled while the call was in flight
    #[error("connection cancelled")]
    Cancelled,
}

impl AdapterError {
    pub fn connect(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connect {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the outbound transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("flush failed: {0}")]
    Flush(String),

    /// Client went away
    #[error("client disconnected")]
    Disconnected,
}

/// Raised when pushing into an output buffer that has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("output buffer closed")]
pub struct BufferClosed;

/// Service-level errors (not per-session).
#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// HTTP server failed while serving
    #[error("server error: {0}")]
    Serve(String),
}
