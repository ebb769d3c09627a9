//! Coinbase frame decoder
//!
//! Turns one raw WebSocket payload into a [`PriceEvent`], an explicit
//! "ignored" outcome for non-ticker frames, or a [`DecodeError`].

use super::types::{PriceEvent, Side};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Message kind carried by ticker frames
const TICKER_KIND: &str = "ticker";

/// Outcome of decoding a frame that was not malformed
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A price tick
    Tick(PriceEvent),
    /// A well-formed frame of another kind; skipped, not an error
    Ignored(FrameKind),
}

/// Kinds of non-ticker frames the feed sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Subscription acknowledgment
    Subscriptions,
    /// Channel heartbeat
    Heartbeat,
    /// Error reported by the exchange
    Error,
    /// Anything else
    Other(String),
}

impl FrameKind {
    fn from_type(kind: &str) -> Self {
        match kind {
            "subscriptions" => FrameKind::Subscriptions,
            "heartbeat" => FrameKind::Heartbeat,
            "error" => FrameKind::Error,
            other => FrameKind::Other(other.to_string()),
        }
    }
}

/// Per-frame decode failures. Never fatal: the caller drops the frame.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// Payload is not JSON or does not have the ticker shape
    #[error("Malformed frame: {0}")]
    Malformed(String),
    /// A numeric field could not be parsed
    #[error("Invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    /// A numeric field parsed to NaN or infinity
    #[error("Non-finite value in {field}")]
    NonFinite { field: &'static str },
    /// The time field is not RFC 3339
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
    /// The side field is neither buy nor sell
    #[error("Unknown side: {0:?}")]
    UnknownSide(String),
}

#[derive(Debug, Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type", borrow)]
    kind: &'a str,
}

/// Ticker message as sent on the wire; numbers arrive as strings
#[derive(Debug, Deserialize)]
struct RawTicker<'a> {
    sequence: u64,
    product_id: String,
    price: &'a str,
    open_24h: &'a str,
    volume_24h: &'a str,
    low_24h: &'a str,
    high_24h: &'a str,
    volume_30d: &'a str,
    best_bid: &'a str,
    best_bid_size: &'a str,
    best_ask: &'a str,
    best_ask_size: &'a str,
    side: &'a str,
    time: &'a str,
    trade_id: u64,
    last_size: &'a str,
}

/// Decode a single frame payload
pub fn decode_frame(payload: &[u8]) -> Result<Decoded, DecodeError> {
    let envelope: Envelope<'_> =
        serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if envelope.kind != TICKER_KIND {
        return Ok(Decoded::Ignored(FrameKind::from_type(envelope.kind)));
    }

    let raw: RawTicker<'_> =
        serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    Ok(Decoded::Tick(PriceEvent {
        product_id: raw.product_id,
        sequence: raw.sequence,
        price: parse_number("price", raw.price)?,
        open_24h: parse_number("open_24h", raw.open_24h)?,
        volume_24h: parse_number("volume_24h", raw.volume_24h)?,
        low_24h: parse_number("low_24h", raw.low_24h)?,
        high_24h: parse_number("high_24h", raw.high_24h)?,
        volume_30d: parse_number("volume_30d", raw.volume_30d)?,
        best_bid: parse_number("best_bid", raw.best_bid)?,
        best_bid_size: parse_number("best_bid_size", raw.best_bid_size)?,
        best_ask: parse_number("best_ask", raw.best_ask)?,
        best_ask_size: parse_number("best_ask_size", raw.best_ask_size)?,
        side: parse_side(raw.side)?,
        time: parse_time(raw.time)?,
        trade_id: raw.trade_id,
        last_size: parse_number("last_size", raw.last_size)?,
    }))
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, DecodeError> {
    let parsed: f64 = value.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })?;

    // NaN or inf would poison the running mean for the key forever
    if !parsed.is_finite() {
        return Err(DecodeError::NonFinite { field });
    }

    Ok(parsed)
}

fn parse_side(value: &str) -> Result<Side, DecodeError> {
    match value {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(DecodeError::UnknownSide(other.to_string())),
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DecodeError::InvalidTimestamp(value.to_string()))
}
