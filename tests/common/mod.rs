//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use edgeweave::config::EdgeweaveConfig;
use edgeweave::edge::{CacheEntry, MemoryNode, NodeBackend, NodeRegistry, NodeTier};
use edgeweave::error::{EdgeError, Result};
use edgeweave::events::EventBus;
use edgeweave::prediction::{ContentSource, Prediction};
use edgeweave::provider::{GatewayConfig, MemoryProvider, ProviderGateway};
use edgeweave::{EdgeCacheOrchestrator, OrchestratorBuilder};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Standard five-node topology used across the integration tests.
pub const TOPOLOGY: [(&str, NodeTier); 5] = [
    ("edge-us-east", NodeTier::Edge),
    ("edge-global", NodeTier::Edge),
    ("regional-us-east-1", NodeTier::Regional),
    ("regional-eu-west-1", NodeTier::Regional),
    ("origin", NodeTier::Origin),
];

/// A memory node with injectable faults and latency.
pub struct ScriptedNode {
    inner: MemoryNode,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_invalidations: AtomicBool,
    fail_health: AtomicBool,
    delay_ms: AtomicU64,
    writes: AtomicU64,
    reads: AtomicU64,
}

impl ScriptedNode {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryNode::new(name, 16 * 1024 * 1024),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_invalidations: AtomicBool::new(false),
            fail_health: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_invalidations(&self, fail: bool) {
        self.fail_invalidations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_health(&self, fail: bool) {
        self.fail_health.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Reads straight from the backing store, bypassing faults and counters.
    pub async fn peek(&self, path: &str) -> Option<Bytes> {
        self.inner.fetch(path).await.ok().flatten()
    }

    async fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn fault(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(EdgeError::Internal(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeBackend for ScriptedNode {
    async fn store(&self, entry: CacheEntry) -> Result<()> {
        self.pause().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Self::fault(&self.fail_writes, "write")?;
        self.inner.store(entry).await
    }

    async fn fetch(&self, path: &str) -> Result<Option<Bytes>> {
        self.pause().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Self::fault(&self.fail_reads, "read")?;
        self.inner.fetch(path).await
    }

    async fn invalidate(&self, paths: &[String], recursive: bool) -> Result<u64> {
        self.pause().await;
        Self::fault(&self.fail_invalidations, "invalidation")?;
        self.inner.invalidate(paths, recursive).await
    }

    async fn health_check(&self) -> Result<()> {
        self.pause().await;
        Self::fault(&self.fail_health, "health")?;
        self.inner.health_check().await
    }
}

/// Content source that counts fetches per path and can be slowed down.
pub struct CountingSource {
    delay: Duration,
    fetches: Mutex<HashMap<String, u64>>,
    missing: Mutex<Vec<String>>,
}

impl CountingSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fetches: Mutex::new(HashMap::new()),
            missing: Mutex::new(Vec::new()),
        }
    }

    /// Makes fetches for `path` fail.
    pub fn mark_missing(&self, path: &str) {
        self.missing.lock().push(path.to_string());
    }

    pub fn fetches(&self, path: &str) -> u64 {
        self.fetches.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> u64 {
        self.fetches.lock().values().sum()
    }
}

#[async_trait]
impl ContentSource for CountingSource {
    async fn fetch(&self, prediction: &Prediction) -> Result<Bytes> {
        *self.fetches.lock().entry(prediction.path.clone()).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.missing.lock().contains(&prediction.path) {
            return Err(EdgeError::ContentSource {
                path: prediction.path.clone(),
                reason: "not found".to_string(),
            });
        }
        Ok(Bytes::from(format!("warm:{}", prediction.path)))
    }
}

/// Orchestrator over scripted nodes plus cloudflare (active) and fastly providers.
pub struct Harness {
    pub orchestrator: Arc<EdgeCacheOrchestrator>,
    pub nodes: HashMap<&'static str, Arc<ScriptedNode>>,
    pub cloudflare: Arc<MemoryProvider>,
    pub fastly: Arc<MemoryProvider>,
    pub source: Arc<CountingSource>,
    pub events: Arc<EventBus>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(test_config(), Duration::ZERO, |builder| builder)
    }

    pub fn with(
        config: EdgeweaveConfig,
        source_delay: Duration,
        customize: impl FnOnce(OrchestratorBuilder) -> OrchestratorBuilder,
    ) -> Self {
        let registry = Arc::new(NodeRegistry::default());
        let mut nodes = HashMap::new();
        for (location, tier) in TOPOLOGY {
            let node = Arc::new(ScriptedNode::new(location));
            registry.register(location, tier, node.clone());
            nodes.insert(location, node);
        }

        let events = Arc::new(EventBus::default());
        let gateway = Arc::new(ProviderGateway::new(
            GatewayConfig::from_config(&config),
            events.clone(),
        ));
        let cloudflare = Arc::new(MemoryProvider::new("cloudflare", "https://cdn.example.com"));
        let fastly = Arc::new(MemoryProvider::new("fastly", "https://fastly.example.com"));
        gateway.register(cloudflare.clone());
        gateway.register(fastly.clone());
        gateway.set_active("cloudflare").unwrap();

        let source = Arc::new(CountingSource::new(source_delay));
        let builder = EdgeCacheOrchestrator::builder(config)
            .registry(registry)
            .gateway(gateway)
            .events(events.clone())
            .content_source(source.clone());
        let orchestrator = Arc::new(customize(builder).build().unwrap());

        Self {
            orchestrator,
            nodes,
            cloudflare,
            fastly,
            source,
            events,
        }
    }

    pub fn node(&self, location: &str) -> &Arc<ScriptedNode> {
        &self.nodes[location]
    }
}

/// Default config with short timeouts.
pub fn test_config() -> EdgeweaveConfig {
    let mut config = EdgeweaveConfig::default();
    config.orchestrator.node_timeout = Duration::from_millis(200);
    config.orchestrator.provider_timeout = Duration::from_millis(200);
    config
}

pub fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
