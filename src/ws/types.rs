//! WebSocket types and configuration

use std::time::Duration;
use thiserror::Error;

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Maximum time allowed for the TCP/TLS/WebSocket handshake
    pub connect_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the handshake timeout
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }
}

/// Transport errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Handshake did not finish in time
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    /// The peer closed the stream
    #[error("Connection closed: {0}")]
    Closed(String),
    /// Reading the next frame failed
    #[error("Read failed: {0}")]
    ReadFailed(String),
    /// Send failed
    #[error("Send failed: {0}")]
    SendFailed(String),
}
