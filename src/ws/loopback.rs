//! In-process transport driven through channels
//!
//! Behaves like a well-mannered server: frames pushed through
//! [`LoopbackFeed`] are delivered in order, and a close request from the
//! control half ends the stream once queued frames have been read.

use super::types::TransportError;
use super::{FrameControl, FrameSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Create a connected loopback triple
pub fn loopback(capacity: usize) -> (LoopbackFeed, LoopbackSource, LoopbackControl) {
    let (tx, rx) = mpsc::channel(capacity);
    let closed = CancellationToken::new();
    let sent = Arc::new(Mutex::new(Vec::new()));

    (
        LoopbackFeed {
            tx,
            sent: sent.clone(),
            closed: closed.clone(),
        },
        LoopbackSource {
            rx,
            closed: closed.clone(),
        },
        LoopbackControl {
            sent,
            closed,
            echo_close: true,
        },
    )
}

/// Server side of the loopback: pushes frames and inspects what the client sent
#[derive(Clone)]
pub struct LoopbackFeed {
    tx: mpsc::Sender<Vec<u8>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: CancellationToken,
}

impl LoopbackFeed {
    /// Deliver one frame to the client
    pub async fn push(&self, frame: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.tx
            .send(frame.into())
            .await
            .map_err(|_| TransportError::SendFailed("loopback source dropped".to_string()))
    }

    /// Frames the client sent, in order
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Whether the client asked to close
    pub fn close_requested(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Receive half of the loopback
pub struct LoopbackSource {
    rx: mpsc::Receiver<Vec<u8>>,
    closed: CancellationToken,
}

#[async_trait]
impl FrameSource for LoopbackSource {
    async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        tokio::select! {
            biased;
            frame = self.rx.recv() => {
                frame.ok_or_else(|| TransportError::Closed("loopback feed dropped".to_string()))
            }
            _ = self.closed.cancelled() => {
                Err(TransportError::Closed("close requested".to_string()))
            }
        }
    }
}

/// Control half of the loopback
pub struct LoopbackControl {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: CancellationToken,
    echo_close: bool,
}

impl LoopbackControl {
    /// Ignore close requests, like a server that never answers the close frame
    pub fn unresponsive(mut self) -> Self {
        self.echo_close = false;
        self
    }
}

#[async_trait]
impl FrameControl for LoopbackControl {
    async fn send_frame(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.sent.lock().push(payload);
        Ok(())
    }

    async fn send_close(&self) -> Result<(), TransportError> {
        if self.echo_close {
            self.closed.cancel();
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}
