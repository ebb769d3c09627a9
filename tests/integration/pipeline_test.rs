//! End-to-end pipeline tests over the loopback transport

use crate::support::{lazy_writer, tick, BrokenSink, RecordingSink, SUBSCRIPTIONS_ACK};
use std::sync::Arc;
use std::time::Duration;
use ticker_pipe::aggregate::StreamingAggregator;
use ticker_pipe::config::Config;
use ticker_pipe::feed::subscribe_message;
use ticker_pipe::pipeline::{
    Coordinator, PipelineConfig, ShutdownReason, SinkFailurePolicy, SinkLane, StreamEnd,
};
use ticker_pipe::sink::MemoryBus;
use ticker_pipe::ws::{loopback, TransportError};

fn pipeline_config(on_sink_failure: SinkFailurePolicy) -> PipelineConfig {
    PipelineConfig {
        close_timeout: Duration::from_millis(200),
        on_sink_failure,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_stream_end_drains_every_lane() {
    let (feed, source, control) = loopback(16);
    let timeseries = RecordingSink::default();
    let (producer, consumer) = MemoryBus::open("coinbase-ticker", 64);
    let aggregator = Arc::new(StreamingAggregator::new());
    let subscribe = subscribe_message("ticker", &["BTC-USD".to_string(), "ETH-USD".to_string()]).unwrap();

    feed.push(SUBSCRIPTIONS_ACK).await.unwrap();
    feed.push(tick(1, "BTC-USD", "1000")).await.unwrap();
    feed.push(tick(2, "BTC-USD", "0")).await.unwrap();
    feed.push(r#"{"type":"ticker","price":"#).await.unwrap();
    feed.push(tick(3, "ETH-USD", "2000.5")).await.unwrap();
    drop(feed);

    let report = Coordinator::new(pipeline_config(SinkFailurePolicy::Degrade))
        .lane(SinkLane::new("timeseries", 1, timeseries.clone(), lazy_writer(500)))
        .lane(SinkLane::new("bus", 10, producer, lazy_writer(500)))
        .aggregate(consumer, aggregator.clone())
        .subscribe(subscribe)
        .run(source, control, std::future::pending())
        .await;

    assert_eq!(report.reason, ShutdownReason::StreamEnded);
    let ingestion = report.ingestion.unwrap();
    assert_eq!(ingestion.frames_received, 5);
    assert_eq!(ingestion.ticks_published, 3);
    assert_eq!(ingestion.frames_ignored, 1);
    assert_eq!(ingestion.decode_errors, 1);

    // Nothing was written until the final flush, which happened exactly once
    assert_eq!(timeseries.sequences(), vec![vec![1, 2, 3]]);
    assert!(*timeseries.closed.lock());

    for outcome in &report.lanes {
        let written = outcome.result.as_ref().unwrap();
        assert_eq!(written.events_written, 3, "lane {}", outcome.name);
        assert_eq!(written.flushes, 1);
    }
    assert!(report.lane_stats.iter().all(|s| s.delivered == 3 && !s.detached));

    assert_eq!(report.consumer.unwrap().records_consumed, 3);
    assert_eq!(aggregator.query("BTC-USD"), Some(500.0));
    assert_eq!(aggregator.query_count("BTC-USD"), 2);
    assert_eq!(aggregator.query("ETH-USD"), Some(2000.5));
    assert_eq!(aggregator.query("SOL-USD"), None);
}

#[tokio::test]
async fn test_malformed_frame_reaches_no_sink() {
    let (feed, source, control) = loopback(4);
    let timeseries = RecordingSink::default();
    let (producer, consumer) = MemoryBus::open("coinbase-ticker", 8);
    let aggregator = Arc::new(StreamingAggregator::new());

    feed.push(tick(9, "BTC-USD", "not-a-number")).await.unwrap();
    drop(feed);

    let report = Coordinator::new(pipeline_config(SinkFailurePolicy::Degrade))
        .lane(SinkLane::new("timeseries", 1, timeseries.clone(), lazy_writer(500)))
        .lane(SinkLane::new("bus", 10, producer, lazy_writer(500)))
        .aggregate(consumer, aggregator.clone())
        .run(source, control, std::future::pending())
        .await;

    assert_eq!(report.ingestion.unwrap().decode_errors, 1);
    assert!(timeseries.sequences().is_empty());
    assert_eq!(report.consumer.unwrap().records_consumed, 0);
    assert!(aggregator.is_empty());
}

#[tokio::test]
async fn test_interrupt_flushes_buffered_events_once() {
    let (feed, source, control) = loopback(16);
    let timeseries = RecordingSink::default();
    let bus = RecordingSink::default();
    let subscribe = subscribe_message("ticker", &["BTC-USD".to_string()]).unwrap();

    for seq in 1..=3 {
        feed.push(tick(seq, "BTC-USD", "37512.01")).await.unwrap();
    }

    let report = Coordinator::new(pipeline_config(SinkFailurePolicy::Degrade))
        .lane(SinkLane::new("timeseries", 1, timeseries.clone(), lazy_writer(500)))
        .lane(SinkLane::new("bus", 10, bus.clone(), lazy_writer(500)))
        .subscribe(subscribe.clone())
        .run(source, control, async {})
        .await;

    assert_eq!(report.reason, ShutdownReason::Interrupted);
    assert_eq!(feed.sent_frames(), vec![subscribe]);
    assert!(feed.close_requested());

    let ingestion = report.ingestion.unwrap();
    assert_eq!(ingestion.ticks_published, 3);
    assert!(matches!(ingestion.end, StreamEnd::Transport(TransportError::Closed(_))));

    assert_eq!(timeseries.sequences(), vec![vec![1, 2, 3]]);
    assert_eq!(bus.sequences(), vec![vec![1, 2, 3]]);
}

#[tokio::test]
async fn test_unanswered_close_cancels_ingestion() {
    let (feed, source, control) = loopback(16);
    let timeseries = RecordingSink::default();

    feed.push(tick(1, "ETH-USD", "2000")).await.unwrap();
    feed.push(tick(2, "ETH-USD", "2001")).await.unwrap();

    let report = Coordinator::new(pipeline_config(SinkFailurePolicy::Degrade))
        .lane(SinkLane::new("timeseries", 1, timeseries.clone(), lazy_writer(500)))
        .run(source, control.unresponsive(), async {})
        .await;

    assert_eq!(report.reason, ShutdownReason::Interrupted);
    let ingestion = report.ingestion.unwrap();
    assert_eq!(ingestion.end, StreamEnd::Cancelled);
    assert_eq!(ingestion.ticks_published, 2);

    // Cancelling ingestion still closes the lanes, so the writer flushed
    assert_eq!(timeseries.sequences(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn test_sink_failure_degrades_by_default() {
    let (feed, source, control) = loopback(16);
    let bus = RecordingSink::default();

    for seq in 1..=4 {
        feed.push(tick(seq, "BTC-USD", "100")).await.unwrap();
    }
    drop(feed);

    let report = Coordinator::new(pipeline_config(SinkFailurePolicy::Degrade))
        .lane(SinkLane::new("timeseries", 1, BrokenSink, lazy_writer(1)))
        .lane(SinkLane::new("bus", 10, bus.clone(), lazy_writer(500)))
        .run(source, control, std::future::pending())
        .await;

    assert_eq!(report.reason, ShutdownReason::StreamEnded);
    assert_eq!(report.ingestion.unwrap().ticks_published, 4);

    let failed = &report.lanes[0];
    assert_eq!(failed.name, "timeseries");
    assert!(failed.result.is_err());

    // The healthy lane kept everything
    assert_eq!(bus.sequences(), vec![vec![1, 2, 3, 4]]);
    assert!(report.lanes[1].result.is_ok());
}

#[tokio::test]
async fn test_sink_failure_can_shut_down() {
    let (feed, source, control) = loopback(16);
    let bus = RecordingSink::default();

    feed.push(tick(1, "BTC-USD", "100")).await.unwrap();

    let report = Coordinator::new(pipeline_config(SinkFailurePolicy::Shutdown))
        .lane(SinkLane::new("timeseries", 1, BrokenSink, lazy_writer(1)))
        .lane(SinkLane::new("bus", 10, bus.clone(), lazy_writer(500)))
        .run(source, control, std::future::pending())
        .await;

    assert_eq!(report.reason, ShutdownReason::SinkFailed("timeseries".to_string()));
    assert!(feed.close_requested());
    assert_eq!(bus.sequences(), vec![vec![1]]);
}

#[tokio::test]
async fn test_zero_sized_settings_from_config() {
    let config: Config = toml::from_str(
        r#"
            [pipeline]
            inbound_capacity = 0
            timeseries_lane_capacity = 0
            bus_lane_capacity = 0

            [timeseries]
            flush_interval_ms = 0

            [bus]
            capacity = 0
            flush_interval_ms = 0
        "#,
    )
    .unwrap();

    let (feed, source, control) = loopback(16);
    let timeseries = RecordingSink::default();
    let (producer, consumer) = MemoryBus::open(&config.bus.topic, config.bus.capacity);
    let aggregator = Arc::new(StreamingAggregator::new());

    for seq in 1..=3 {
        feed.push(tick(seq, "ETH-USD", "2000")).await.unwrap();
    }
    drop(feed);

    let report = Coordinator::new(config.pipeline.pipeline_config())
        .lane(SinkLane::new(
            "timeseries",
            config.pipeline.timeseries_lane_capacity,
            timeseries.clone(),
            config.timeseries.batch.writer_config(),
        ))
        .lane(SinkLane::new(
            "bus",
            config.pipeline.bus_lane_capacity,
            producer,
            config.bus.batch.writer_config(),
        ))
        .aggregate(consumer, aggregator.clone())
        .run(source, control, std::future::pending())
        .await;

    assert_eq!(report.reason, ShutdownReason::StreamEnded);
    assert!(report.lanes.iter().all(|lane| lane.result.is_ok()));
    assert_eq!(timeseries.sequences().concat(), vec![1, 2, 3]);
    assert_eq!(aggregator.query_count("ETH-USD"), 3);
}

#[tokio::test]
async fn test_degraded_pipeline_stops_when_every_lane_failed() {
    let (feed, source, control) = loopback(16);

    feed.push(tick(1, "BTC-USD", "100")).await.unwrap();

    let report = Coordinator::new(pipeline_config(SinkFailurePolicy::Degrade))
        .lane(SinkLane::new("timeseries", 1, BrokenSink, lazy_writer(1)))
        .lane(SinkLane::new("bus", 10, BrokenSink, lazy_writer(1)))
        .run(source, control, std::future::pending())
        .await;

    assert_eq!(report.reason, ShutdownReason::NoHealthyLanes);
    assert!(feed.close_requested());
    assert!(report.lanes.iter().all(|lane| lane.result.is_err()));
}
