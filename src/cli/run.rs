//! Run command implementation

use crate::aggregate::StreamingAggregator;
use crate::config::Config;
use crate::feed::subscribe_message;
use crate::pipeline::{Coordinator, SinkLane};
use crate::sink::{IlpSink, MemoryBus};
use crate::ws::{WsConfig, WsTransport};
use anyhow::Context;
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Channel to listen to. One of ticker or ticker_batch
    #[arg(long)]
    pub channel: Option<String>,

    /// Address of QuestDB's InfluxDB line protocol endpoint
    #[arg(long)]
    pub qdb: Option<String>,

    /// Address for the Prometheus metrics endpoint
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Do not serve metrics
    #[arg(long, conflicts_with = "metrics_addr")]
    pub no_metrics: bool,

    /// Product ids to subscribe to (overrides the configured list)
    pub product_ids: Vec<String>,
}

impl RunArgs {
    /// Fold command-line overrides into `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(channel) = &self.channel {
            config.feed.channel = channel.clone();
        }
        if let Some(addr) = &self.qdb {
            config.timeseries.addr = addr.clone();
        }
        if let Some(addr) = self.metrics_addr {
            config.telemetry.metrics_addr = Some(addr);
        }
        if self.no_metrics {
            config.telemetry.metrics_addr = None;
        }
        if !self.product_ids.is_empty() {
            config.feed.product_ids = self.product_ids.clone();
        }
    }

    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        // Sinks come up before the feed so an unreachable store aborts early
        let ilp = IlpSink::connect(&config.timeseries.addr, &config.timeseries.table)
            .await
            .context("could not connect to QuestDB line protocol")?;
        let (producer, consumer) = MemoryBus::open(&config.bus.topic, config.bus.capacity);
        let aggregator = Arc::new(StreamingAggregator::new());

        let ws_config = WsConfig::new(&config.feed.url)
            .connect_timeout(Duration::from_millis(config.feed.connect_timeout_ms));
        let (source, control) = WsTransport::connect(&ws_config)
            .await
            .context("could not connect to feed")?;
        let subscribe = subscribe_message(&config.feed.channel, &config.feed.product_ids)?;

        tracing::info!(
            channel = %config.feed.channel,
            products = ?config.feed.product_ids,
            "Starting pipeline"
        );

        let report = Coordinator::new(config.pipeline.pipeline_config())
            .lane(SinkLane::new(
                "timeseries",
                config.pipeline.timeseries_lane_capacity,
                ilp,
                config.timeseries.batch.writer_config(),
            ))
            .lane(SinkLane::new(
                "bus",
                config.pipeline.bus_lane_capacity,
                producer,
                config.bus.batch.writer_config(),
            ))
            .aggregate(consumer, aggregator.clone())
            .subscribe(subscribe)
            .run(source, control, shutdown_signal())
            .await;

        for (product_id, state) in aggregator.snapshot() {
            tracing::info!(%product_id, count = state.count, mean = state.mean, "Final aggregate");
        }

        let mut failed = 0;
        for lane in &report.lanes {
            match &lane.result {
                Ok(r) => tracing::info!(
                    lane = %lane.name,
                    written = r.events_written,
                    flushes = r.flushes,
                    "Lane drained"
                ),
                Err(e) => {
                    failed += 1;
                    tracing::error!(lane = %lane.name, error = %e, "Lane failed");
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("{} sink lane(s) failed", failed);
        }
        Ok(())
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            channel: None,
            qdb: None,
            metrics_addr: None,
            no_metrics: false,
            product_ids: vec![],
        }
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let mut config = Config::default();
        args().apply(&mut config);
        assert_eq!(config.feed.channel, "ticker");
        assert_eq!(config.feed.product_ids, vec!["ETH-USD", "BTC-USD"]);
        assert!(config.telemetry.metrics_addr.is_some());
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        let args = RunArgs {
            channel: Some("ticker_batch".to_string()),
            qdb: Some("db:9009".to_string()),
            no_metrics: true,
            product_ids: vec!["SOL-USD".to_string()],
            ..args()
        };
        args.apply(&mut config);

        assert_eq!(config.feed.channel, "ticker_batch");
        assert_eq!(config.timeseries.addr, "db:9009");
        assert_eq!(config.feed.product_ids, vec!["SOL-USD"]);
        assert!(config.telemetry.metrics_addr.is_none());
    }
}
