//! Observability module for edgeweave.
//!
//! Provides logging and Prometheus metrics.

use crate::config::ObservabilityConfig;
use crate::error::{EdgeError, Result};
use crate::shutdown::Shutdown;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use ::tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. A non-empty `RUST_LOG` overrides the configured level.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            parse_filter(&directives, EnvFilter::DEFAULT_ENV)?
        }
        _ => parse_filter(&config.log_level, "observability.log_level")?,
    };

    let output = if config.json_logs {
        fmt::layer().json().flatten_event(true).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| EdgeError::Internal(format!("Failed to init logging: {}", e)))?;

    info!(level = %config.log_level, json = config.json_logs, "Logging initialized");
    Ok(())
}

fn parse_filter(directives: &str, source: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| EdgeError::InvalidConfig {
        field: source.to_string(),
        reason: format!("bad log filter '{}': {}", directives, e),
    })
}

/// Serves `/metrics` and `/health` until shutdown is triggered.
pub async fn run_metrics_server(config: ObservabilityConfig, shutdown: Shutdown) -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| EdgeError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();

    let app = axum::Router::new()
        .route("/metrics", axum::routing::get(move || async move {
            handle.render()
        }))
        .route("/health", axum::routing::get(|| async { "OK" }));

    let listener = TcpListener::bind(config.metrics_addr).await?;
    info!(addr = %config.metrics_addr, "Metrics server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .map_err(|e| EdgeError::Internal(format!("Metrics server failed: {}", e)))?;

    Ok(())
}

/// Register standard metrics.
fn register_metrics() {
    counter!("edgeweave_lookups_total").absolute(0);
    counter!("edgeweave_cache_hits_total").absolute(0);
    counter!("edgeweave_cache_misses_total").absolute(0);
    counter!("edgeweave_writes_total").absolute(0);
    counter!("edgeweave_invalidations_total").absolute(0);
    counter!("edgeweave_warmups_total").absolute(0);
    counter!("edgeweave_provider_switches_total").absolute(0);
    gauge!("edgeweave_cache_hit_rate").set(0.0);
}

/// Record a lookup.
pub fn record_lookup(strategy: &str, hit: bool) {
    counter!("edgeweave_lookups_total", "strategy" => strategy.to_string()).increment(1);
    if hit {
        counter!("edgeweave_cache_hits_total").increment(1);
    } else {
        counter!("edgeweave_cache_misses_total").increment(1);
    }
}

/// Record a fan-out write.
pub fn record_write(strategy: &str, cached_nodes: usize, bytes: u64) {
    counter!("edgeweave_writes_total", "strategy" => strategy.to_string()).increment(1);
    counter!("edgeweave_bytes_written_total").increment(bytes * cached_nodes as u64);
}

pub fn record_invalidation(entries: u64) {
    counter!("edgeweave_invalidations_total").increment(entries);
}

pub fn record_warmup(warmed: usize) {
    counter!("edgeweave_warmups_total").increment(warmed as u64);
}

pub fn record_provider_switch(from: &str, to: &str) {
    counter!(
        "edgeweave_provider_switches_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Record a node call latency.
pub fn record_node_latency(node: &str, millis: f64) {
    histogram!("edgeweave_node_response_time_ms", "node" => node.to_string()).record(millis);
}

pub fn update_hit_rate(hit_rate: f64) {
    gauge!("edgeweave_cache_hit_rate").set(hit_rate);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_accepts_levels_and_targets() {
        assert!(parse_filter("info", "observability.log_level").is_ok());
        assert!(parse_filter("edgeweave=debug,warn", "observability.log_level").is_ok());
    }

    #[test]
    fn test_parse_filter_names_the_source() {
        match parse_filter("edgeweave=loud", "observability.log_level") {
            Err(EdgeError::InvalidConfig { field, reason }) => {
                assert_eq!(field, "observability.log_level");
                assert!(reason.contains("edgeweave=loud"));
            }
            other => panic!("expected invalid config, got {:?}", other.map(|_| ())),
        }
    }
}
