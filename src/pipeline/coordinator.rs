//! Lifecycle coordinator: starts every lane, supervises sink writers and
//! runs the graceful shutdown

use super::broadcaster::{Broadcaster, LaneStats, OverflowPolicy};
use super::ingestion::{run_ingestion, IngestionReport};
use crate::aggregate::{run_bus_consumer, ConsumerReport, StreamingAggregator};
use crate::sink::{BatchSink, BatchedWriter, BusConsumer, SinkError, WriterConfig, WriterReport};
use crate::ws::{FrameControl, FrameSource};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// What the coordinator does when a sink lane fails for good
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFailurePolicy {
    /// Log it and keep the remaining lanes running
    #[default]
    Degrade,
    /// Shut the whole pipeline down gracefully
    Shutdown,
}

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the broadcaster's inbound queue
    pub inbound_capacity: usize,
    pub overflow: OverflowPolicy,
    /// How long to wait for the feed to answer the close frame
    pub close_timeout: Duration,
    pub on_sink_failure: SinkFailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 200,
            overflow: OverflowPolicy::Block,
            close_timeout: Duration::from_secs(1),
            on_sink_failure: SinkFailurePolicy::Degrade,
        }
    }
}

/// One downstream lane: a bounded fan-out queue feeding a batched writer
pub struct SinkLane {
    pub name: String,
    pub capacity: usize,
    pub sink: Box<dyn BatchSink>,
    pub writer: WriterConfig,
}

impl SinkLane {
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        sink: impl BatchSink + 'static,
        writer: WriterConfig,
    ) -> Self {
        Self {
            name: name.into(),
            capacity,
            sink: Box::new(sink),
            writer,
        }
    }
}

/// Why shutdown started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The feed ended on its own
    StreamEnded,
    /// External interrupt
    Interrupted,
    /// A sink lane failed under [`SinkFailurePolicy::Shutdown`]
    SinkFailed(String),
    /// Every sink lane failed, so nothing is left to feed
    NoHealthyLanes,
    /// The subscribe request could not be sent
    SubscribeFailed(String),
}

/// Final outcome of one lane's writer
#[derive(Debug)]
pub struct LaneOutcome {
    pub name: String,
    pub result: Result<WriterReport, SinkError>,
}

/// Everything the pipeline did, available once every task has been joined
#[derive(Debug)]
pub struct PipelineReport {
    pub reason: ShutdownReason,
    pub ingestion: Option<IngestionReport>,
    pub lane_stats: Vec<LaneStats>,
    pub lanes: Vec<LaneOutcome>,
    pub consumer: Option<ConsumerReport>,
}

struct LaneFailure {
    lane: String,
    error: String,
}

/// Owns startup and coordinated shutdown of the whole pipeline
pub struct Coordinator {
    config: PipelineConfig,
    lanes: Vec<SinkLane>,
    consumer: Option<(BusConsumer, Arc<StreamingAggregator>)>,
    subscribe: Option<Vec<u8>>,
}

impl Coordinator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            lanes: Vec::new(),
            consumer: None,
            subscribe: None,
        }
    }

    /// Add a sink lane
    pub fn lane(mut self, lane: SinkLane) -> Self {
        self.lanes.push(lane);
        self
    }

    /// Feed `aggregator` from the bus topic behind `consumer`
    pub fn aggregate(mut self, consumer: BusConsumer, aggregator: Arc<StreamingAggregator>) -> Self {
        self.consumer = Some((consumer, aggregator));
        self
    }

    /// Frame sent on the control half once every lane is running
    pub fn subscribe(mut self, payload: Vec<u8>) -> Self {
        self.subscribe = Some(payload);
        self
    }

    /// Run until the feed ends, `interrupt` resolves, or a lane failure
    /// demands shutdown. Returns after every task has been joined, so all
    /// writers have done their final flush.
    pub async fn run<S, C, F>(self, source: S, control: C, interrupt: F) -> PipelineReport
    where
        S: FrameSource + 'static,
        C: FrameControl,
        F: Future<Output = ()>,
    {
        let Self {
            config,
            lanes,
            consumer,
            subscribe,
        } = self;

        let ingest_cancel = CancellationToken::new();
        let consumer_cancel = CancellationToken::new();
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<LaneFailure>();
        let (publisher, mut broadcaster) = Broadcaster::new(config.inbound_capacity, config.overflow);

        let mut writers: Vec<(String, JoinHandle<Result<WriterReport, SinkError>>)> = Vec::new();
        for lane in lanes {
            let rx = broadcaster.add_lane(lane.name.clone(), lane.capacity);
            let writer = BatchedWriter::new(lane.name.clone(), lane.sink, lane.writer);
            let failures = failure_tx.clone();
            let name = lane.name.clone();

            let handle = tokio::spawn(async move {
                let result = writer.run(rx).await;
                if let Err(e) = &result {
                    let _ = failures.send(LaneFailure {
                        lane: name,
                        error: e.to_string(),
                    });
                }
                result
            });
            writers.push((lane.name, handle));
        }
        drop(failure_tx);

        let broadcast_handle = tokio::spawn(broadcaster.run());

        let consumer_handle = consumer.map(|(consumer, aggregator)| {
            tokio::spawn(run_bus_consumer(consumer, aggregator, consumer_cancel.clone()))
        });

        let mut ingest_handle = tokio::spawn(run_ingestion(source, publisher, ingest_cancel.clone()));

        let mut early_exit = None;
        if let Some(payload) = subscribe {
            if let Err(e) = control.send_frame(payload).await {
                tracing::error!(error = %e, "Failed to send subscribe request");
                early_exit = Some(ShutdownReason::SubscribeFailed(e.to_string()));
            } else {
                tracing::info!("Subscribe request sent");
            }
        }

        tokio::pin!(interrupt);
        let mut healthy_lanes = writers.len();
        let mut failures_open = true;
        let mut ingestion_result = None;

        let reason = match early_exit {
            Some(reason) => reason,
            None => loop {
                tokio::select! {
                    result = &mut ingest_handle => {
                        ingestion_result = Some(result);
                        break ShutdownReason::StreamEnded;
                    }
                    _ = &mut interrupt => {
                        tracing::info!("Interrupt received");
                        break ShutdownReason::Interrupted;
                    }
                    failure = failure_rx.recv(), if failures_open => match failure {
                        Some(LaneFailure { lane, error }) => {
                            tracing::error!(%lane, %error, policy = ?config.on_sink_failure, "Sink lane failed");
                            if config.on_sink_failure == SinkFailurePolicy::Shutdown {
                                break ShutdownReason::SinkFailed(lane);
                            }
                            healthy_lanes -= 1;
                            if healthy_lanes == 0 {
                                tracing::error!("No healthy sink lanes left, shutting down");
                                break ShutdownReason::NoHealthyLanes;
                            }
                        }
                        None => failures_open = false,
                    },
                }
            },
        };

        let ingestion_result = match ingestion_result {
            Some(result) => result,
            None => Self::close_feed(&control, &mut ingest_handle, &ingest_cancel, config.close_timeout).await,
        };
        control.close().await;

        let ingestion = joined("ingestion", ingestion_result);

        // Ingestion dropped its publisher, so the broadcaster closes every lane
        let lane_stats = joined("broadcaster", broadcast_handle.await).unwrap_or_default();

        let mut outcomes = Vec::with_capacity(writers.len());
        for (name, handle) in writers {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(lane = %name, error = %e, "Writer task panicked");
                    Err(SinkError::Closed)
                }
            };
            outcomes.push(LaneOutcome { name, result });
        }

        // Writers closed the bus producer; give the consumer time to drain
        let consumer = match consumer_handle {
            Some(mut handle) => {
                let result = match tokio::time::timeout(config.close_timeout, &mut handle).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!("Bus consumer still running, cancelling");
                        consumer_cancel.cancel();
                        handle.await
                    }
                };
                joined("bus consumer", result)
            }
            None => None,
        };

        tracing::info!(?reason, "Pipeline stopped");

        PipelineReport {
            reason,
            ingestion,
            lane_stats,
            lanes: outcomes,
            consumer,
        }
    }

    /// Send the close frame, give the feed `timeout` to end the stream, then
    /// cancel ingestion outright
    async fn close_feed<C: FrameControl>(
        control: &C,
        ingest_handle: &mut JoinHandle<IngestionReport>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<IngestionReport, JoinError> {
        if let Err(e) = control.send_close().await {
            tracing::error!(error = %e, "Failed to send close frame");
            cancel.cancel();
            return ingest_handle.await;
        }

        match tokio::time::timeout(timeout, &mut *ingest_handle).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(?timeout, "Feed did not close in time, cancelling ingestion");
                cancel.cancel();
                ingest_handle.await
            }
        }
    }
}

fn joined<T>(task: &str, result: Result<T, JoinError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(task, error = %e, "Task failed");
            None
        }
    }
}
