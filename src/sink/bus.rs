//! In-process message bus
//!
//! A single keyed topic: producers publish JSON-encoded events keyed by
//! product id and a consumer fetches them in publish order.

use super::{BatchSink, SinkError};
use crate::feed::PriceEvent;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default topic name
pub const DEFAULT_TOPIC: &str = "coinbase-ticker";

/// Bus errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Every producer (or the consumer) is gone
    #[error("Topic {0} is closed")]
    Closed(String),
    /// An event could not be serialized
    #[error("Encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One message on the topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    /// Partition key (product id)
    pub key: String,
    /// JSON-encoded [`PriceEvent`]
    pub value: Vec<u8>,
}

/// Factory for a connected producer/consumer pair
pub struct MemoryBus;

impl MemoryBus {
    /// Open `topic` with room for `capacity` in-flight records (at least one)
    pub fn open(topic: impl Into<String>, capacity: usize) -> (BusProducer, BusConsumer) {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            BusProducer {
                topic: topic.clone(),
                tx: Some(tx),
            },
            BusConsumer { topic, rx },
        )
    }
}

/// Producer side of a topic
pub struct BusProducer {
    topic: String,
    tx: Option<mpsc::Sender<BusRecord>>,
}

impl BusProducer {
    /// Topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a batch, keyed by product id, in batch order
    pub async fn publish(&self, batch: &[PriceEvent]) -> Result<(), BusError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| BusError::Closed(self.topic.clone()))?;

        // Encode everything first so a bad event never leaves a partial batch
        let records = batch
            .iter()
            .map(|event| {
                Ok(BusRecord {
                    key: event.product_id.clone(),
                    value: serde_json::to_vec(event)?,
                })
            })
            .collect::<Result<Vec<_>, BusError>>()?;

        for record in records {
            tx.send(record)
                .await
                .map_err(|_| BusError::Closed(self.topic.clone()))?;
        }

        Ok(())
    }

    /// Stop producing; the consumer sees end-of-topic once drained
    pub fn close(&mut self) {
        self.tx = None;
    }
}

#[async_trait]
impl BatchSink for BusProducer {
    async fn write_batch(&mut self, batch: &[PriceEvent]) -> Result<(), SinkError> {
        self.publish(batch).await?;
        tracing::debug!(topic = %self.topic, count = batch.len(), "Published batch");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        BusProducer::close(self);
        Ok(())
    }
}

/// Consumer side of a topic
pub struct BusConsumer {
    topic: String,
    rx: mpsc::Receiver<BusRecord>,
}

impl BusConsumer {
    /// Topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next record
    pub async fn fetch_next(&mut self) -> Result<BusRecord, BusError> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| BusError::Closed(self.topic.clone()))
    }

    /// Stop consuming; pending publishes fail
    pub fn close(&mut self) {
        self.rx.close();
    }
}
