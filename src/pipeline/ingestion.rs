//! Ingestion loop: transport → decoder → broadcaster

use super::broadcaster::Publisher;
use crate::feed::{decode_frame, Decoded, FrameKind};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use crate::ws::{FrameSource, TransportError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why the ingestion loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The transport reported an error or closed; treated as end of stream
    Transport(TransportError),
    /// External cancellation
    Cancelled,
    /// The broadcaster went away
    BroadcasterClosed,
}

/// Counters for one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub frames_received: u64,
    pub ticks_published: u64,
    pub frames_ignored: u64,
    pub decode_errors: u64,
    pub end: StreamEnd,
}

/// Read frames until the stream ends or `cancel` fires.
///
/// Decode failures and non-ticker frames never stop the loop. `publisher` is
/// dropped on return, which closes the broadcaster input.
pub async fn run_ingestion<S: FrameSource>(
    mut source: S,
    publisher: Publisher,
    cancel: CancellationToken,
) -> IngestionReport {
    let mut frames_received = 0;
    let mut ticks_published = 0;
    let mut frames_ignored = 0;
    let mut decode_errors = 0;

    let end = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            result = source.recv_frame() => match result {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "Feed read ended");
                    break StreamEnd::Transport(e);
                }
            },
        };

        let started = Instant::now();
        frames_received += 1;
        telemetry::increment(CounterMetric::FramesReceived);
        tracing::trace!(payload = %String::from_utf8_lossy(&frame), "recv");

        match decode_frame(&frame) {
            Ok(Decoded::Tick(event)) => {
                let published = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break StreamEnd::Cancelled,
                    result = publisher.publish(event) => result,
                };
                if published.is_err() {
                    tracing::error!("Broadcaster closed, stopping ingestion");
                    break StreamEnd::BroadcasterClosed;
                }

                ticks_published += 1;
                telemetry::increment(CounterMetric::FramesProcessed);
                telemetry::record_latency(LatencyMetric::Processing, started.elapsed());
            }
            Ok(Decoded::Ignored(FrameKind::Error)) => {
                frames_ignored += 1;
                telemetry::increment(CounterMetric::FramesIgnored);
                tracing::warn!(payload = %String::from_utf8_lossy(&frame), "Feed reported an error");
            }
            Ok(Decoded::Ignored(kind)) => {
                frames_ignored += 1;
                telemetry::increment(CounterMetric::FramesIgnored);
                tracing::info!(?kind, payload = %String::from_utf8_lossy(&frame), "Received non-ticker frame");
            }
            Err(e) => {
                decode_errors += 1;
                telemetry::increment(CounterMetric::DecodeErrors);
                tracing::warn!(error = %e, payload = %String::from_utf8_lossy(&frame), "Dropping undecodable frame");
            }
        }
    };

    tracing::info!(
        frames_received,
        ticks_published,
        frames_ignored,
        decode_errors,
        end = ?end,
        "Ingestion stopped"
    );

    IngestionReport {
        frames_received,
        ticks_published,
        frames_ignored,
        decode_errors,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Broadcaster, OverflowPolicy};
    use crate::ws::loopback;

    const TICK: &str = r#"{"type":"ticker","sequence":1,"product_id":"BTC-USD","price":"1000","open_24h":"1","volume_24h":"1","low_24h":"1","high_24h":"1","volume_30d":"1","best_bid":"1","best_bid_size":"1","best_ask":"1","best_ask_size":"1","side":"buy","time":"2023-11-16T03:51:21Z","trade_id":1,"last_size":"1"}"#;

    #[tokio::test]
    async fn test_mixed_frames() {
        let (feed, source, _control) = loopback(16);
        let (publisher, mut broadcaster) = Broadcaster::new(16, OverflowPolicy::Block);
        let mut lane = broadcaster.add_lane("lane", 16);
        tokio::spawn(broadcaster.run());

        feed.push(r#"{"type":"subscriptions","channels":[]}"#).await.unwrap();
        feed.push(TICK).await.unwrap();
        feed.push(TICK.replace(r#""price":"1000""#, r#""price":"abc""#)).await.unwrap();
        feed.push(TICK).await.unwrap();
        drop(feed);

        let report = run_ingestion(source, publisher, CancellationToken::new()).await;
        assert_eq!(report.frames_received, 4);
        assert_eq!(report.ticks_published, 2);
        assert_eq!(report.frames_ignored, 1);
        assert_eq!(report.decode_errors, 1);
        assert!(matches!(report.end, StreamEnd::Transport(TransportError::Closed(_))));

        assert_eq!(lane.recv().await.unwrap().price, 1000.0);
        assert_eq!(lane.recv().await.unwrap().price, 1000.0);
        // Publisher dropped with the loop, so the lane closes
        assert!(lane.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_loop() {
        let (_feed, source, _control) = loopback(1);
        let (publisher, broadcaster) = Broadcaster::new(1, OverflowPolicy::Block);
        tokio::spawn(broadcaster.run());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_ingestion(source, publisher, cancel).await;
        assert_eq!(report.end, StreamEnd::Cancelled);
        assert_eq!(report.frames_received, 0);
    }

    #[tokio::test]
    async fn test_broadcaster_gone() {
        let (feed, source, _control) = loopback(4);
        let (publisher, broadcaster) = Broadcaster::new(1, OverflowPolicy::Block);
        drop(broadcaster);

        feed.push(TICK).await.unwrap();
        let report = run_ingestion(source, publisher, CancellationToken::new()).await;
        assert_eq!(report.end, StreamEnd::BroadcasterClosed);
        assert_eq!(report.ticks_published, 0);
    }
}
