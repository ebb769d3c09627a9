//! Configuration loading tests

use std::io::Write;
use ticker_pipe::config::Config;
use ticker_pipe::pipeline::{OverflowPolicy, SinkFailurePolicy};

#[test]
fn test_example_config_loads() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example")).unwrap();
    assert_eq!(config.feed.channel, "ticker");
    assert_eq!(config.pipeline.timeseries_lane_capacity, 1);
    assert_eq!(config.pipeline.bus_lane_capacity, 10);
    assert_eq!(config.pipeline.overflow, OverflowPolicy::Block);
    assert_eq!(config.pipeline.on_sink_failure, SinkFailurePolicy::Degrade);
    assert_eq!(config.timeseries.batch.flush_interval_ms, 2000);
}

#[test]
fn test_partial_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[feed]\nproduct_ids = [\"SOL-USD\"]").unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.feed.product_ids, vec!["SOL-USD"]);
    assert_eq!(config.bus.topic, "coinbase-ticker");
}

#[test]
fn test_malformed_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[feed\nchannel = ").unwrap();
    assert!(Config::load(file.path()).is_err());
}
