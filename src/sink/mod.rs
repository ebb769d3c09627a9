//! Downstream sinks
//!
//! Every lane ends in a [`BatchedWriter`] wrapping a [`BatchSink`]: QuestDB
//! over line protocol for the time-series lane and the in-process bus for
//! the message-bus lane.

pub mod bus;
mod questdb;
mod writer;

pub use bus::{BusConsumer, BusError, BusProducer, BusRecord, MemoryBus};
pub use questdb::{format_line, IlpSink, DEFAULT_ILP_ADDR, DEFAULT_TABLE};
pub use writer::{BatchedWriter, WriterConfig, WriterReport};

use crate::feed::PriceEvent;
use async_trait::async_trait;
use thiserror::Error;

/// Sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Could not reach the downstream system
    #[error("Connect failed: {0}")]
    Connect(String),
    /// I/O error while writing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Message bus error
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    /// The sink was already closed
    #[error("Sink closed")]
    Closed,
    /// Every retry of a batch write failed
    #[error("Lane {lane}: batch of {pending} events failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        lane: String,
        attempts: u32,
        pending: usize,
        #[source]
        source: Box<SinkError>,
    },
}

/// A downstream system that accepts whole batches
#[async_trait]
pub trait BatchSink: Send {
    /// Write every event in `batch`, in order. On error nothing is assumed
    /// to have been durably written and the caller may retry the whole batch.
    async fn write_batch(&mut self, batch: &[PriceEvent]) -> Result<(), SinkError>;

    /// Release the sink after the final flush
    async fn close(&mut self) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: BatchSink + ?Sized> BatchSink for Box<S> {
    async fn write_batch(&mut self, batch: &[PriceEvent]) -> Result<(), SinkError> {
        (**self).write_batch(batch).await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        (**self).close().await
    }
}
