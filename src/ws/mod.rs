//! Feed transport
//!
//! The pipeline only sees two narrow seams: a [`FrameSource`] that yields raw
//! frames and a [`FrameControl`] that sends frames and the close handshake.
//! The WebSocket implementation and an in-process loopback both provide them.

mod client;
mod loopback;
mod types;

pub use client::{WsControl, WsFrameSource, WsTransport};
pub use loopback::{loopback, LoopbackControl, LoopbackFeed, LoopbackSource};
pub use types::{TransportError, WsConfig};

use async_trait::async_trait;

/// Receive half of a feed connection
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next data frame. Any error ends the stream.
    async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Send half of a feed connection
#[async_trait]
pub trait FrameControl: Send + Sync {
    /// Send a data frame
    async fn send_frame(&self, payload: Vec<u8>) -> Result<(), TransportError>;
    /// Start the close handshake
    async fn send_close(&self) -> Result<(), TransportError>;
    /// Tear down the send half
    async fn close(&self);
}
