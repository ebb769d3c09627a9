use clap::Parser;
use ticker_pipe::cli::{Cli, Commands};
use ticker_pipe::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    if let Commands::Run(args) = &cli.command {
        args.apply(&mut config);
    }

    match cli.command {
        Commands::Run(args) => {
            // Initialize telemetry
            ticker_pipe::telemetry::init_telemetry(&config.telemetry)?;
            tracing::info!("Starting ticker pipeline");
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Feed: {} {} {:?}", config.feed.url, config.feed.channel, config.feed.product_ids);
            println!(
                "  Pipeline: inbound={} timeseries_lane={} bus_lane={} overflow={:?} on_sink_failure={:?}",
                config.pipeline.inbound_capacity,
                config.pipeline.timeseries_lane_capacity,
                config.pipeline.bus_lane_capacity,
                config.pipeline.overflow,
                config.pipeline.on_sink_failure
            );
            println!(
                "  QuestDB: {} table={} flush={}ms",
                config.timeseries.addr, config.timeseries.table, config.timeseries.batch.flush_interval_ms
            );
            println!(
                "  Bus: topic={} flush={}ms",
                config.bus.topic, config.bus.batch.flush_interval_ms
            );
            match config.telemetry.metrics_addr {
                Some(addr) => println!("  Metrics: http://{}/metrics", addr),
                None => println!("  Metrics: disabled"),
            }
        }
    }

    Ok(())
}
