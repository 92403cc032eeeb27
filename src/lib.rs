//! Edgeweave - CDN cache orchestration.
//!
//! Edgeweave decides which cache nodes take part in every read, write and
//! invalidation, keeps a set of CDN providers in sync with automatic failover
//! queueing, and warms caches ahead of demand from a recency-weighted access model.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   EdgeCacheOrchestrator                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Strategies: Tiered | Smart | Predictive | Geographic       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Node Registry: Edge | Regional | Origin                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Provider Gateway: Rules | Sync | Health | Failover Queue   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Predictive Engine | Metrics Aggregator | Event Bus         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use edgeweave::config::EdgeweaveConfig;
//!
//! #[tokio::main]
//! async fn main() -> edgeweave::Result<()> {
//!     let config = EdgeweaveConfig::development();
//!     edgeweave::run(config).await
//! }
//! ```

pub mod config;
pub mod error;

pub mod aggregator;
pub mod edge;
pub mod events;
pub mod orchestrator;
pub mod pattern;
pub mod prediction;
pub mod provider;
pub mod resilience;
pub mod shutdown;
pub mod strategy;

pub mod cli;
pub mod observability;

// Re-exports
pub use error::{EdgeError, Result};
pub use orchestrator::{EdgeCacheOrchestrator, OrchestratorBuilder};
pub use strategy::StrategyKind;

use config::EdgeweaveConfig;
use edge::{MemoryNode, NodeRegistry};
use events::EventBus;
use orchestrator::BackgroundTasks;
use provider::{GatewayConfig, MemoryProvider, ProviderGateway};
use resilience::HealthThresholds;
use shutdown::{Shutdown, SignalHandler};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Builds an orchestrator over in-memory nodes and providers taken from the
/// configured topology.
pub fn build_orchestrator(config: EdgeweaveConfig) -> Result<EdgeCacheOrchestrator> {
    let registry = Arc::new(NodeRegistry::new(HealthThresholds {
        down_after: config.health.node_fail_after,
        recover_after: config.health.recover_after,
    }));
    for spec in &config.topology.nodes {
        registry.register(
            spec.location.clone(),
            spec.tier,
            Arc::new(MemoryNode::new(spec.location.clone(), spec.capacity_bytes)),
        );
    }

    let events = Arc::new(EventBus::default());
    let gateway = Arc::new(ProviderGateway::new(
        GatewayConfig::from_config(&config),
        events.clone(),
    ));
    for spec in &config.providers.providers {
        gateway.register(Arc::new(MemoryProvider::new(
            spec.name.clone(),
            spec.base_url.clone(),
        )));
    }
    if let Some(active) = &config.providers.active {
        gateway.set_active(active)?;
    }

    EdgeCacheOrchestrator::builder(config)
        .registry(registry)
        .gateway(gateway)
        .events(events)
        .build()
}

/// Run the edgeweave service with the given configuration.
pub async fn run(config: EdgeweaveConfig) -> Result<()> {
    observability::init(&config.observability)?;

    let schedule = config.schedule.clone();
    let observability_config = config.observability.clone();
    let orchestrator = Arc::new(build_orchestrator(config)?);
    info!(
        nodes = orchestrator.registry().len(),
        providers = orchestrator.gateway().providers().len(),
        active = ?orchestrator.gateway().active(),
        "Starting edgeweave"
    );

    let shutdown = Shutdown::new();
    let tasks = BackgroundTasks::spawn(orchestrator.clone(), &schedule, &shutdown);

    let metrics_handle = if observability_config.metrics_enabled {
        info!("Starting metrics server on {}", observability_config.metrics_addr);
        let stop = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = observability::run_metrics_server(observability_config, stop).await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let signals = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = SignalHandler::new(signals.clone()).run().await {
            error!("Signal handler error: {}", e);
            signals.trigger();
        }
    });

    shutdown.wait().await;
    info!("Shutting down edgeweave gracefully...");

    tasks.shutdown(schedule.shutdown_grace).await;

    if let Some(handle) = metrics_handle {
        if tokio::time::timeout(schedule.shutdown_grace, handle).await.is_err() {
            warn!("Metrics server did not stop in time");
        }
    }

    info!("Edgeweave shutdown complete");
    Ok(())
}
