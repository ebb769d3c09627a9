//! Bus consumer that feeds the aggregator

use super::StreamingAggregator;
use crate::feed::PriceEvent;
use crate::sink::{BusConsumer, BusError};
use crate::telemetry::{self, CounterMetric};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Consumer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub records_consumed: u64,
    pub decode_errors: u64,
}

/// Read the topic until it closes or `cancel` fires, folding each record
/// into `aggregator`
pub async fn run_bus_consumer(
    mut consumer: BusConsumer,
    aggregator: Arc<StreamingAggregator>,
    cancel: CancellationToken,
) -> ConsumerReport {
    let mut report = ConsumerReport::default();
    tracing::info!(topic = consumer.topic(), "Bus consumer started");

    loop {
        let record = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Bus consumer cancelled");
                break;
            }
            result = consumer.fetch_next() => match result {
                Ok(record) => record,
                Err(BusError::Closed(topic)) => {
                    tracing::info!(%topic, "Topic closed, bus consumer stopping");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Bus fetch failed");
                    break;
                }
            },
        };

        let event: PriceEvent = match serde_json::from_slice(&record.value) {
            Ok(event) => event,
            Err(e) => {
                report.decode_errors += 1;
                telemetry::increment(CounterMetric::ConsumerDecodeErrors);
                tracing::warn!(
                    error = %e,
                    key = %record.key,
                    payload = %String::from_utf8_lossy(&record.value),
                    "Dropping undecodable bus record"
                );
                continue;
            }
        };

        let state = aggregator.update(&event);
        report.records_consumed += 1;
        telemetry::set_product_state(&event.product_id, state);
        tracing::debug!(
            product_id = %event.product_id,
            count = state.count,
            mean = state.mean,
            "Aggregate updated"
        );
    }

    consumer.close();
    report
}
