//! Output relay: the single consumer of the output buffer.
//!
//! Each payload becomes one framed record on the transport, followed by a
//! flush. A write or flush failure is fatal to the session: the relay cancels
//! the connection context and stops consuming. A client that hung up is a
//! disconnect, not a failure.

use super::buffer::OutputDrain;
use crate::domain::{ConnectionContext, TransportError};
use crate::metrics::StreamMetrics;
use crate::ports::OutboundTransport;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, error};

/// Literal prefix of every record
pub const RECORD_PREFIX: &[u8] = b"data: ";

/// Record terminator (blank line)
pub const RECORD_TERMINATOR: &[u8] = b"\n\n";

/// Frame one payload as a server-push record.
pub fn frame_record(payload: &[u8]) -> Bytes {
    let mut record =
        BytesMut::with_capacity(RECORD_PREFIX.len() + payload.len() + RECORD_TERMINATOR.len());
    record.put_slice(RECORD_PREFIX);
    record.put_slice(payload);
    record.put_slice(RECORD_TERMINATOR);
    record.freeze()
}

/// How the relay ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Records written and flushed
    pub relayed: u64,
    /// Set when the relay stopped on a write or flush failure
    pub transport_error: Option<TransportError>,
    /// Set when the relay stopped because the client was gone
    pub client_gone: bool,
}

pub struct OutputRelay<T: OutboundTransport> {
    drain: OutputDrain,
    transport: T,
    ctx: ConnectionContext,
    metrics: Arc<StreamMetrics>,
}

impl<T: OutboundTransport> OutputRelay<T> {
    pub fn new(
        drain: OutputDrain,
        transport: T,
        ctx: ConnectionContext,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            drain,
            transport,
            ctx,
            metrics,
        }
    }

    /// Run until the buffer is closed and drained, or the transport fails.
    pub async fn run(mut self) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();

        while let Some(payload) = self.drain.next().await {
            debug!(connection_id = %self.ctx.id(), "Received new data on output buffer");

            match self.deliver(&payload).await {
                Ok(()) => {}
                Err(TransportError::Disconnected) => {
                    debug!(connection_id = %self.ctx.id(), "Client gone, dropping remaining output");
                    outcome.client_gone = true;
                    self.ctx.cancel();
                    break;
                }
                Err(e) => {
                    error!(connection_id = %self.ctx.id(), error = %e, "Failed to write event to client");
                    self.metrics.record_transport_failure();
                    outcome.transport_error = Some(e);
                    self.ctx.cancel();
                    break;
                }
            }

            outcome.relayed += 1;
            self.metrics.record_event_relayed();
        }

        debug!(
            connection_id = %self.ctx.id(),
            relayed = outcome.relayed,
            "Output buffer closed, relay stopped"
        );
        outcome
    }

    async fn deliver(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.transport.write(frame_record(payload)).await?;
        self.transport.flush().await
    }
}
