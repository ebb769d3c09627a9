//! Ticker feed module
//!
//! Decodes Coinbase Exchange ticker frames and builds the subscription
//! request that starts the stream.

mod decoder;
mod types;

pub use decoder::{decode_frame, DecodeError, Decoded, FrameKind};
pub use types::{PriceEvent, Side};

use serde::Serialize;

/// Coinbase Exchange WebSocket feed URL
pub const COINBASE_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

#[derive(Debug, Serialize)]
struct SubscribeChannel<'a> {
    name: &'a str,
    product_ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    channels: [SubscribeChannel<'a>; 1],
}

/// Build the subscribe request for `channel` ("ticker" or "ticker_batch")
pub fn subscribe_message(channel: &str, product_ids: &[String]) -> anyhow::Result<Vec<u8>> {
    let request = SubscribeRequest {
        kind: "subscribe",
        channels: [SubscribeChannel {
            name: channel,
            product_ids,
        }],
    };
    Ok(serde_json::to_vec(&request)?)
}
