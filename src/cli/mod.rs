//! Command-line interface for edgeweave.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Edgeweave - CDN cache orchestration.
#[derive(Parser)]
#[command(name = "edgeweave")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (JSON). The development configuration is used when absent.
    #[arg(short, long, env = "EDGEWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "EDGEWEAVE_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestrator and its background timers until SIGINT/SIGTERM
    Run {
        /// Serve Prometheus metrics
        #[arg(long)]
        metrics: bool,

        /// Emit JSON logs
        #[arg(long)]
        json_logs: bool,
    },

    /// Validate a configuration file and print the resolved topology
    Validate,

    /// Print the development configuration as JSON
    DefaultConfig,

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
