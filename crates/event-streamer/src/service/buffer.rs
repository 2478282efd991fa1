//! Bounded multi-producer, single-consumer output buffer.
//!
//! Producers block while the buffer is full (backpressure, never drop).
//! Closing is explicit: once closed, pushes fail and the consumer drains
//! whatever was already accepted before observing end-of-input.

use crate::domain::BufferClosed;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Create a buffer holding at most `capacity` payloads.
pub fn output_buffer(capacity: usize) -> (OutputBuffer, OutputDrain) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (closed_tx, closed_rx) = watch::channel(false);
    let closed_tx = Arc::new(closed_tx);
    (
        OutputBuffer {
            tx,
            closed_tx,
            closed_rx: closed_rx.clone(),
        },
        OutputDrain {
            rx,
            closed_rx,
            draining: false,
        },
    )
}

/// Producer side. Cheap to clone, one clone per listener.
#[derive(Clone)]
pub struct OutputBuffer {
    tx: mpsc::Sender<Bytes>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl OutputBuffer {
    /// Push one payload, waiting for room while the buffer is full.
    pub async fn push(&self, payload: Bytes) -> Result<(), BufferClosed> {
        if self.is_closed() {
            return Err(BufferClosed);
        }

        let mut closed = self.closed_rx.clone();
        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => Err(BufferClosed),
            sent = self.tx.send(payload) => sent.map_err(|_| BufferClosed),
        }
    }

    /// Close the buffer. Idempotent.
    pub fn close(&self) {
        self.closed_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow() || self.tx.is_closed()
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer side, owned by the output relay.
pub struct OutputDrain {
    rx: mpsc::Receiver<Bytes>,
    closed_rx: watch::Receiver<bool>,
    draining: bool,
}

impl OutputDrain {
    /// Next payload in arrival order, or `None` once closed and drained
    /// (or once every producer is gone).
    pub async fn next(&mut self) -> Option<Bytes> {
        if self.draining {
            return self.rx.recv().await;
        }

        tokio::select! {
            biased;
            payload = self.rx.recv() => return payload,
            _ = wait_closed(&mut self.closed_rx) => {}
        }

        // Refuse new sends, keep what was accepted.
        self.rx.close();
        self.draining = true;
        self.rx.recv().await
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}
