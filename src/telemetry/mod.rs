//! Telemetry module
//!
//! Logging and the Prometheus summary endpoint

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use self::metrics::{
    increment, increment_lane, install_exporter, record_latency, set_product_state,
    CounterMetric, LaneMetric, LatencyMetric,
};

use crate::config::TelemetryConfig;

/// Initialize logging and, when configured, the metrics endpoint.
///
/// Must run inside a tokio runtime: the exporter spawns its HTTP listener.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level, config.log_format)?;

    if let Some(addr) = config.metrics_addr {
        install_exporter(addr)?;
    }

    Ok(())
}
