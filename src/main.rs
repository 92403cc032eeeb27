//! Edgeweave CLI - Main entry point.

use anyhow::Context;
use edgeweave::cli::{Cli, Commands};
use edgeweave::config::EdgeweaveConfig;

fn load_config(cli: &Cli) -> anyhow::Result<EdgeweaveConfig> {
    let mut config = match &cli.config {
        Some(path) => EdgeweaveConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EdgeweaveConfig::development(),
    };
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match &cli.command {
        Commands::Run { metrics, json_logs } => {
            let mut config = load_config(&cli)?;
            config.observability.metrics_enabled |= *metrics;
            config.observability.json_logs |= *json_logs;

            edgeweave::run(config).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli)?;
            let orchestrator = edgeweave::build_orchestrator(config)?;

            println!("Configuration OK");
            println!(
                "Default strategy: {}",
                orchestrator.config().orchestrator.default_strategy
            );
            println!("Nodes:");
            for node in orchestrator.registry().snapshots() {
                println!("  {:<24} {}", node.location, node.tier);
            }
            println!("Providers:");
            let active = orchestrator.gateway().active();
            for name in orchestrator.gateway().providers() {
                let marker = if active.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!(" {} {}", marker, name);
            }
        }

        Commands::DefaultConfig => {
            let json = serde_json::to_string_pretty(&EdgeweaveConfig::development())?;
            println!("{}", json);
        }

        Commands::Version => {
            println!("Edgeweave v{}", env!("CARGO_PKG_VERSION"));
            println!("CDN cache orchestration with provider failover and predictive warmup");
        }
    }

    Ok(())
}
