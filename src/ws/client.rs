//! WebSocket transport over tokio-tungstenite

use super::types::{TransportError, WsConfig};
use super::{FrameControl, FrameSource};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a WebSocket endpoint and splits it into receive and send halves
pub struct WsTransport;

impl WsTransport {
    /// Connect and return the receive half and the control (send) half
    pub async fn connect(config: &WsConfig) -> Result<(WsFrameSource, WsControl), TransportError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(&config.url))
                .await
                .map_err(|_| TransportError::ConnectTimeout(config.connect_timeout))?
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (write, read) = ws_stream.split();

        tracing::info!("WebSocket connected");

        Ok((
            WsFrameSource { read },
            WsControl {
                write: Mutex::new(write),
            },
        ))
    }
}

/// Receive half of a WebSocket connection
pub struct WsFrameSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    tracing::info!(%reason, "Received close frame");
                    return Err(TransportError::Closed(reason));
                }
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::ReadFailed(e.to_string())),
                None => return Err(TransportError::Closed("stream ended".to_string())),
            }
        }
    }
}

/// Send half of a WebSocket connection
pub struct WsControl {
    write: Mutex<SplitSink<WsStream, Message>>,
}

#[async_trait]
impl FrameControl for WsControl {
    async fn send_frame(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        let message = match String::from_utf8(payload) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };

        self.write
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn send_close(&self) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed(""),
        };

        self.write
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.write.lock().await.close().await {
            tracing::debug!(error = %e, "WebSocket sink already closed");
        }
    }
}
