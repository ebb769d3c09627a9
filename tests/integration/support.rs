//! Shared test doubles

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use ticker_pipe::feed::PriceEvent;
use ticker_pipe::sink::{BatchSink, SinkError, WriterConfig};
use std::time::Duration;

/// Sink that records every batch it is handed
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub batches: Arc<Mutex<Vec<Vec<PriceEvent>>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl RecordingSink {
    pub fn sequences(&self) -> Vec<Vec<u64>> {
        self.batches
            .lock()
            .iter()
            .map(|b| b.iter().map(|e| e.sequence).collect())
            .collect()
    }
}

#[async_trait]
impl BatchSink for RecordingSink {
    async fn write_batch(&mut self, batch: &[PriceEvent]) -> Result<(), SinkError> {
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Sink whose writes always fail
pub struct BrokenSink;

#[async_trait]
impl BatchSink for BrokenSink {
    async fn write_batch(&mut self, _batch: &[PriceEvent]) -> Result<(), SinkError> {
        Err(SinkError::Connect("questdb unreachable".to_string()))
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writer that only flushes at end-of-stream (or when `max_batch` fills)
pub fn lazy_writer(max_batch: usize) -> WriterConfig {
    WriterConfig {
        flush_interval: Duration::from_secs(3600),
        max_batch,
        max_retries: 0,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    }
}

/// A ticker frame as Coinbase sends it
pub fn tick(sequence: u64, product_id: &str, price: &str) -> String {
    serde_json::json!({
        "type": "ticker",
        "sequence": sequence,
        "product_id": product_id,
        "price": price,
        "open_24h": "35586.77",
        "volume_24h": "20560.37728398",
        "low_24h": "35586.76",
        "high_24h": "37987",
        "volume_30d": "395876.65432201",
        "best_bid": "37512.01",
        "best_bid_size": "0.02036921",
        "best_ask": "37514.82",
        "best_ask_size": "0.17618076",
        "side": "buy",
        "time": "2023-11-16T03:51:21.377233Z",
        "trade_id": sequence,
        "last_size": "0.00131924"
    })
    .to_string()
}

pub const SUBSCRIPTIONS_ACK: &str =
    r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["ETH-USD","BTC-USD"]}]}"#;
