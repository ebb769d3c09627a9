//! Live aggregation
//!
//! Running mean per product, fed from the message-bus topic

mod aggregator;
mod consumer;

pub use aggregator::{AggregateState, StreamingAggregator};
pub use consumer::{run_bus_consumer, ConsumerReport};
