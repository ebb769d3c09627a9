//! CLI interface for ticker-pipe
//!
//! Provides subcommands for:
//! - `run`: Ingest the feed, fan out to the sinks and aggregate
//! - `config`: Show the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ticker-pipe")]
#[command(about = "Coinbase ticker ingestion with fan-out to QuestDB and a message bus")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest, fan out and aggregate until interrupted or the feed ends
    Run(RunArgs),
    /// Show the effective configuration
    Config,
}
