//! Ingestion pipeline
//!
//! Frames flow transport → [`run_ingestion`] → [`Broadcaster`] → one bounded
//! lane per sink → [`crate::sink::BatchedWriter`]. The [`Coordinator`] starts
//! all of it and shuts it down in order.

mod broadcaster;
mod coordinator;
mod ingestion;

pub use broadcaster::{BroadcastClosed, Broadcaster, LaneStats, OverflowPolicy, Publisher};
pub use coordinator::{
    Coordinator, LaneOutcome, PipelineConfig, PipelineReport, ShutdownReason, SinkFailurePolicy,
    SinkLane,
};
pub use ingestion::{run_ingestion, IngestionReport, StreamEnd};
