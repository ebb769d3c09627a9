//! Price event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggressor side of the last trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single decoded ticker message.
///
/// Never mutated after the decoder builds it. Every fan-out lane gets its own
/// clone, so lanes share no state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEvent {
    /// Product identifier (e.g., "BTC-USD"), the aggregation key
    pub product_id: String,
    /// Feed sequence number
    pub sequence: u64,
    /// Last trade price
    pub price: f64,
    pub open_24h: f64,
    pub volume_24h: f64,
    pub low_24h: f64,
    pub high_24h: f64,
    pub volume_30d: f64,
    pub best_bid: f64,
    pub best_bid_size: f64,
    pub best_ask: f64,
    pub best_ask_size: f64,
    /// Aggressor side
    pub side: Side,
    /// Exchange timestamp of the tick
    pub time: DateTime<Utc>,
    /// Identifier of the last trade
    pub trade_id: u64,
    /// Size of the last trade
    pub last_size: f64,
}
