//! Configuration types for ticker-pipe

use crate::feed::COINBASE_WS_URL;
use crate::pipeline::{OverflowPolicy, PipelineConfig, SinkFailurePolicy};
use crate::sink::{bus::DEFAULT_TOPIC, WriterConfig, DEFAULT_ILP_ADDR, DEFAULT_TABLE};
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub timeseries: TimeSeriesConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Upstream feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,

    /// Subscription channel: "ticker" or "ticker_batch"
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_product_ids")]
    pub product_ids: Vec<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_feed_url() -> String {
    COINBASE_WS_URL.to_string()
}
fn default_channel() -> String {
    "ticker".to_string()
}
fn default_product_ids() -> Vec<String> {
    vec!["ETH-USD".to_string(), "BTC-USD".to_string()]
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            channel: default_channel(),
            product_ids: default_product_ids(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Fan-out and shutdown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    /// The time-series sink drains fast, so its lane stays tiny
    #[serde(default = "default_timeseries_lane_capacity")]
    pub timeseries_lane_capacity: usize,

    #[serde(default = "default_bus_lane_capacity")]
    pub bus_lane_capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Wait for the feed to acknowledge the close frame (milliseconds)
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    #[serde(default)]
    pub on_sink_failure: SinkFailurePolicy,
}

fn default_inbound_capacity() -> usize {
    200
}
fn default_timeseries_lane_capacity() -> usize {
    1
}
fn default_bus_lane_capacity() -> usize {
    10
}
fn default_close_timeout_ms() -> u64 {
    1000
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            inbound_capacity: default_inbound_capacity(),
            timeseries_lane_capacity: default_timeseries_lane_capacity(),
            bus_lane_capacity: default_bus_lane_capacity(),
            overflow: OverflowPolicy::default(),
            close_timeout_ms: default_close_timeout_ms(),
            on_sink_failure: SinkFailurePolicy::default(),
        }
    }
}

impl PipelineSection {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            inbound_capacity: self.inbound_capacity,
            overflow: self.overflow,
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            on_sink_failure: self.on_sink_failure,
        }
    }
}

/// Batching knobs shared by both sinks
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    2000
}
fn default_max_batch() -> usize {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_batch: default_max_batch(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl BatchConfig {
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_batch: self.max_batch.max(1),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// QuestDB line-protocol sink
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeriesConfig {
    #[serde(default = "default_ilp_addr")]
    pub addr: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(flatten)]
    pub batch: BatchConfig,
}

fn default_ilp_addr() -> String {
    DEFAULT_ILP_ADDR.to_string()
}
fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            addr: default_ilp_addr(),
            table: default_table(),
            batch: BatchConfig::default(),
        }
    }
}

/// Message bus topic
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    /// In-flight records the topic holds before producers wait
    #[serde(default = "default_topic_capacity")]
    pub capacity: usize,
    #[serde(flatten)]
    pub batch: BatchConfig,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_topic_capacity() -> usize {
    1024
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            capacity: default_topic_capacity(),
            batch: BatchConfig::default(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus scrape address; disabled when absent
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: Option<SocketAddr>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_metrics_addr() -> Option<SocketAddr> {
    Some(SocketAddr::from(([127, 0, 0, 1], 17171)))
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
