//! ticker-pipe: real-time Coinbase ticker ingestion
//!
//! This library provides the core components for:
//! - Decoding ticker frames from the Coinbase Exchange WebSocket feed
//! - Fanning every tick out to independent, bounded sink lanes
//! - Batched writes to QuestDB (line protocol) and a message bus topic
//! - A live per-product running mean fed from the bus topic
//! - Coordinated startup and graceful shutdown
//! - Structured logging and a Prometheus summary endpoint

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod feed;
pub mod pipeline;
pub mod sink;
pub mod telemetry;
pub mod ws;
