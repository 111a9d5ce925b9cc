//! Output Sinks
//!
//! A sink is the writable end of one client connection. Every `send` hands a
//! complete frame to the connection as its own chunk, so partial output is
//! visible to the client immediately; nothing is buffered across fragments.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The connection is gone; the write was dropped
    #[error("sink closed")]
    Closed,
}

/// Writable, flushable byte sink tied to a cancellable connection
#[async_trait]
pub trait FragmentSink: Send + Sync {
    /// Push one frame and flush it
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Closed` if the peer has disconnected.
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkError>;

    /// Resolves once the peer has disconnected
    async fn closed(&self);

    /// Check if the peer is still connected
    fn is_closed(&self) -> bool;
}

/// Sink backed by a bounded channel
///
/// The receiving half becomes the HTTP response body. When the client
/// disconnects the body, and with it the receiver, is dropped, which is
/// what [`FragmentSink::closed`] observes.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Wrap an existing sender
    #[must_use]
    pub fn from_sender(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl FragmentSink for ChannelSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkError> {
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
