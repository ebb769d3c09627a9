//! Batched writer: buffers a lane's events and flushes them on a timer or
//! when the buffer is full

use super::{BatchSink, SinkError};
use crate::feed::PriceEvent;
use crate::telemetry::{self, LaneMetric, LatencyMetric};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, MissedTickBehavior};

/// Shortest flush period the timer accepts
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for one batched writer
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Time between timer-driven flushes
    pub flush_interval: Duration,
    /// Buffer size that forces an immediate flush
    pub max_batch: usize,
    /// Retries after the first failed write of a batch
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub initial_backoff: Duration,
    /// Upper bound for the retry delay
    pub max_backoff: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(2),
            max_batch: 500,
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// What a writer accomplished before its lane closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub lane: String,
    pub events_received: u64,
    pub events_written: u64,
    pub flushes: u64,
}

/// Drives one lane into a [`BatchSink`]
pub struct BatchedWriter<S> {
    sink: S,
    config: WriterConfig,
    buffer: Vec<PriceEvent>,
    report: WriterReport,
}

impl<S: BatchSink> BatchedWriter<S> {
    /// Create a writer for `lane`
    pub fn new(lane: impl Into<String>, sink: S, config: WriterConfig) -> Self {
        let buffer = Vec::with_capacity(config.max_batch);
        Self {
            sink,
            config,
            buffer,
            report: WriterReport {
                lane: lane.into(),
                ..Default::default()
            },
        }
    }

    /// Consume the lane until it closes, then flush what is left and close
    /// the sink.
    ///
    /// Returns an error only when a batch could not be written after all
    /// retries; the receiver is dropped with it so the broadcaster detaches
    /// this lane.
    pub async fn run(mut self, mut rx: mpsc::Receiver<PriceEvent>) -> Result<WriterReport, SinkError> {
        let period = self.config.flush_interval.max(MIN_FLUSH_INTERVAL);
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(lane = %self.report.lane, ?period, max_batch = self.config.max_batch, "Batched writer started");

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(event) => {
                            self.report.events_received += 1;
                            self.buffer.push(event);

                            if self.buffer.len() >= self.config.max_batch {
                                self.flush_or_abort().await?;
                            }
                        }
                        None => break,
                    }
                }

                _ = ticker.tick() => {
                    self.flush_or_abort().await?;
                }
            }
        }

        // Lane closed: final flush of whatever is still buffered
        self.flush_or_abort().await?;
        self.sink.close().await?;

        tracing::info!(
            lane = %self.report.lane,
            written = self.report.events_written,
            flushes = self.report.flushes,
            "Batched writer shutting down"
        );
        Ok(self.report)
    }

    async fn flush_or_abort(&mut self) -> Result<(), SinkError> {
        if let Err(e) = self.flush().await {
            if let Err(close_err) = self.sink.close().await {
                tracing::debug!(lane = %self.report.lane, error = %close_err, "Close after failure");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Write the whole buffer, retrying with exponential backoff
    async fn flush(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let lane = self.report.lane.as_str();
        let count = self.buffer.len();
        let mut attempts = 0;
        let mut backoff = self.config.initial_backoff;

        loop {
            let started = Instant::now();
            match self.sink.write_batch(&self.buffer).await {
                Ok(()) => {
                    telemetry::record_latency(LatencyMetric::SinkFlush, started.elapsed());
                    telemetry::increment_lane(LaneMetric::Flushes, lane, 1);
                    telemetry::increment_lane(LaneMetric::EventsWritten, lane, count as u64);
                    tracing::debug!(lane, count, "Flushed batch");

                    self.report.flushes += 1;
                    self.report.events_written += count as u64;
                    self.buffer.clear();
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    telemetry::increment_lane(LaneMetric::WriteFailures, lane, 1);

                    if attempts > self.config.max_retries {
                        tracing::error!(lane, error = %e, attempts, pending = count, "Batch write failed, giving up");
                        return Err(SinkError::RetriesExhausted {
                            lane: lane.to_string(),
                            attempts,
                            pending: count,
                            source: Box::new(e),
                        });
                    }

                    tracing::warn!(lane, error = %e, attempt = attempts, ?backoff, "Batch write failed, retrying");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }
    }
}
