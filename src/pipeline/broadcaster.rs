//! Fan-out of decoded events to every sink lane

use crate::feed::PriceEvent;
use crate::telemetry::{self, LaneMetric};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// What to do when a lane's buffer is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for space. Nothing is lost, but a lane that stops draining
    /// eventually stalls ingestion.
    #[default]
    Block,
    /// Drop the event for the full lane only and count it
    DropNewest,
}

/// Returned by [`Publisher::publish`] once the distribution task is gone
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Broadcaster closed")]
pub struct BroadcastClosed;

/// Per-lane delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneStats {
    pub name: String,
    pub delivered: u64,
    pub dropped: u64,
    /// The lane's consumer went away and the lane was removed
    pub detached: bool,
}

/// Inbound handle of the broadcaster
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<PriceEvent>,
}

impl Publisher {
    /// Hand an event to the distribution task, waiting while the inbound
    /// queue is full
    pub async fn publish(&self, event: PriceEvent) -> Result<(), BroadcastClosed> {
        self.tx.send(event).await.map_err(|_| BroadcastClosed)
    }
}

struct Lane {
    tx: Option<mpsc::Sender<PriceEvent>>,
    stats: LaneStats,
}

/// Distributes every published event, in order, to each registered lane.
///
/// Dropping every [`Publisher`] ends [`Broadcaster::run`], which closes all
/// lanes so downstream writers see end-of-stream after draining.
pub struct Broadcaster {
    inbound: mpsc::Receiver<PriceEvent>,
    lanes: Vec<Lane>,
    policy: OverflowPolicy,
}

impl Broadcaster {
    /// Create a broadcaster with an inbound queue of `inbound_capacity`.
    /// Capacities of 0 are raised to 1, here and in [`Broadcaster::add_lane`].
    pub fn new(inbound_capacity: usize, policy: OverflowPolicy) -> (Publisher, Self) {
        let (tx, inbound) = mpsc::channel(inbound_capacity.max(1));
        (
            Publisher { tx },
            Self {
                inbound,
                lanes: Vec::new(),
                policy,
            },
        )
    }

    /// Register a lane with its own bounded capacity
    pub fn add_lane(&mut self, name: impl Into<String>, capacity: usize) -> mpsc::Receiver<PriceEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.lanes.push(Lane {
            tx: Some(tx),
            stats: LaneStats {
                name: name.into(),
                ..Default::default()
            },
        });
        rx
    }

    /// Run the distribution loop until every publisher is dropped
    pub async fn run(mut self) -> Vec<LaneStats> {
        tracing::info!(lanes = self.lanes.len(), policy = ?self.policy, "Broadcaster started");

        while let Some(event) = self.inbound.recv().await {
            self.deliver(event).await;
        }

        for lane in &mut self.lanes {
            lane.tx = None;
        }

        tracing::info!("Broadcaster input closed, lanes closed");
        self.lanes.into_iter().map(|l| l.stats).collect()
    }

    async fn deliver(&mut self, event: PriceEvent) {
        let policy = self.policy;

        for lane in &mut self.lanes {
            let Some(tx) = lane.tx.as_ref() else {
                continue;
            };

            let delivered = match policy {
                OverflowPolicy::Block => tx.send(event.clone()).await.is_ok(),
                OverflowPolicy::DropNewest => match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        lane.stats.dropped += 1;
                        telemetry::increment_lane(LaneMetric::Dropped, &lane.stats.name, 1);
                        tracing::debug!(lane = %lane.stats.name, "Lane full, event dropped");
                        continue;
                    }
                    Err(TrySendError::Closed(_)) => false,
                },
            };

            if delivered {
                lane.stats.delivered += 1;
            } else {
                tracing::warn!(lane = %lane.stats.name, "Lane consumer gone, detaching lane");
                lane.tx = None;
                lane.stats.detached = true;
            }
        }
    }
}
