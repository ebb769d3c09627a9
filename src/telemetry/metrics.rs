//! Prometheus metrics

use crate::aggregate::AggregateState;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Pipeline-wide counters
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Raw frames read from the transport
    FramesReceived,
    /// Ticks decoded and handed to the broadcaster
    FramesProcessed,
    /// Well-formed non-ticker frames
    FramesIgnored,
    /// Frames that failed to decode
    DecodeErrors,
    /// Bus records the aggregator could not decode
    ConsumerDecodeErrors,
}

/// Per-lane counters
#[derive(Debug, Clone, Copy)]
pub enum LaneMetric {
    /// Successful batch writes
    Flushes,
    /// Events written by successful batch writes
    EventsWritten,
    /// Failed write attempts
    WriteFailures,
    /// Events dropped by the broadcaster for a full lane
    Dropped,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Decode + publish time for one frame
    Processing,
    /// Duration of one batch write
    SinkFlush,
}

/// Increment a pipeline counter by one
pub fn increment(metric: CounterMetric) {
    let name = match metric {
        CounterMetric::FramesReceived => "ticker_frames_received_total",
        CounterMetric::FramesProcessed => "ticker_frames_processed_total",
        CounterMetric::FramesIgnored => "ticker_frames_ignored_total",
        CounterMetric::DecodeErrors => "ticker_decode_errors_total",
        CounterMetric::ConsumerDecodeErrors => "ticker_consumer_decode_errors_total",
    };
    metrics::counter!(name).increment(1);
}

/// Add `value` to a per-lane counter
pub fn increment_lane(metric: LaneMetric, lane: &str, value: u64) {
    let name = match metric {
        LaneMetric::Flushes => "ticker_sink_flushes_total",
        LaneMetric::EventsWritten => "ticker_sink_events_total",
        LaneMetric::WriteFailures => "ticker_sink_failures_total",
        LaneMetric::Dropped => "ticker_lane_dropped_total",
    };
    metrics::counter!(name, "lane" => lane.to_string()).increment(value);
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let name = match metric {
        LatencyMetric::Processing => "ticker_processing_latency_seconds",
        LatencyMetric::SinkFlush => "ticker_sink_flush_latency_seconds",
    };
    metrics::histogram!(name).record(duration.as_secs_f64());
}

/// Publish a product's running mean and count
pub fn set_product_state(product_id: &str, state: AggregateState) {
    metrics::gauge!("ticker_mean_price", "product_id" => product_id.to_string()).set(state.mean);
    metrics::gauge!("ticker_event_count", "product_id" => product_id.to_string())
        .set(state.count as f64);
}

/// Serve the Prometheus scrape endpoint on `addr`
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter on {}: {}", addr, e))?;

    tracing::info!(%addr, "Metrics endpoint listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        increment(CounterMetric::FramesReceived);
        increment_lane(LaneMetric::Dropped, "bus", 3);
        record_latency(LatencyMetric::Processing, Duration::from_micros(40));
        set_product_state(
            "BTC-USD",
            AggregateState {
                count: 2,
                mean: 500.0,
            },
        );
    }
}
