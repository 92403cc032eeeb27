// Cache node registry

use super::node::{CacheNode, NodeBackend, NodeMetrics, NodeStatus, NodeTier};
use crate::resilience::{HealthLevel, HealthThresholds, HealthTracker};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Weight of the previous EMA value.
const EMA_DECAY: f64 = 0.9;

/// Shared handle to a registered node.
pub type NodeRef = Arc<RegisteredNode>;

/// Outcome of one call against a node, folded into its rolling metrics.
#[derive(Debug, Clone, Default)]
pub struct NodeOutcome {
    pub response_time_ms: Option<f64>,
    /// Bytes written
    pub bytes: Option<u64>,
    pub invalidation_count: Option<u64>,
    /// Read result: `Some(true)` hit, `Some(false)` miss
    pub hit: Option<bool>,
    pub failed: bool,
}

impl NodeOutcome {
    pub fn write(response_time_ms: f64, bytes: u64) -> Self {
        Self {
            response_time_ms: Some(response_time_ms),
            bytes: Some(bytes),
            ..Self::default()
        }
    }

    pub fn read(response_time_ms: f64, hit: bool) -> Self {
        Self {
            response_time_ms: Some(response_time_ms),
            hit: Some(hit),
            ..Self::default()
        }
    }

    pub fn invalidation(response_time_ms: f64, count: u64) -> Self {
        Self {
            response_time_ms: Some(response_time_ms),
            invalidation_count: Some(count),
            ..Self::default()
        }
    }

    pub fn failure(response_time_ms: f64) -> Self {
        Self {
            response_time_ms: Some(response_time_ms),
            failed: true,
            ..Self::default()
        }
    }
}

struct NodeState {
    metrics: NodeMetrics,
    health: HealthTracker,
}

/// A node known to the registry: identity, backend and mutable rolling state.
pub struct RegisteredNode {
    location: String,
    tier: NodeTier,
    backend: Arc<dyn NodeBackend>,
    state: Mutex<NodeState>,
}

impl RegisteredNode {
    fn new(
        location: String,
        tier: NodeTier,
        backend: Arc<dyn NodeBackend>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            location,
            tier,
            backend,
            state: Mutex::new(NodeState {
                metrics: NodeMetrics::default(),
                health: HealthTracker::new(thresholds),
            }),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn tier(&self) -> NodeTier {
        self.tier
    }

    pub fn backend(&self) -> &Arc<dyn NodeBackend> {
        &self.backend
    }

    pub fn status(&self) -> NodeStatus {
        status_from(self.state.lock().health.level())
    }

    pub fn snapshot(&self) -> CacheNode {
        let state = self.state.lock();
        CacheNode {
            location: self.location.clone(),
            tier: self.tier,
            status: status_from(state.health.level()),
            metrics: state.metrics.clone(),
        }
    }

    fn apply(&self, outcome: &NodeOutcome) {
        let mut state = self.state.lock();
        let metrics = &mut state.metrics;

        if let Some(sample) = outcome.response_time_ms {
            metrics.response_time_ema_ms =
                metrics.response_time_ema_ms * EMA_DECAY + sample * (1.0 - EMA_DECAY);
        }
        if let Some(bytes) = outcome.bytes {
            metrics.bandwidth_bytes = metrics.bandwidth_bytes.saturating_add(bytes);
            metrics.writes += 1;
        }
        if let Some(count) = outcome.invalidation_count {
            metrics.invalidations += count;
        }
        match outcome.hit {
            Some(true) => metrics.hits += 1,
            Some(false) => metrics.misses += 1,
            None => {}
        }
        if outcome.failed {
            metrics.failures += 1;
        }

        let lookups = metrics.hits + metrics.misses;
        metrics.hit_rate = if lookups == 0 {
            0.0
        } else {
            metrics.hits as f64 / lookups as f64 * 100.0
        };
    }
}

fn status_from(level: HealthLevel) -> NodeStatus {
    match level {
        HealthLevel::Healthy => NodeStatus::Active,
        HealthLevel::Degraded => NodeStatus::Degraded,
        HealthLevel::Down => NodeStatus::Failed,
    }
}

#[derive(Default)]
struct RegistryInner {
    nodes: HashMap<String, NodeRef>,
    /// Registration order
    order: Vec<String>,
}

/// Registry of known cache nodes. Read-mostly; per-node state is locked per node.
pub struct NodeRegistry {
    inner: RwLock<RegistryInner>,
    thresholds: HealthThresholds,
}

impl NodeRegistry {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            thresholds,
        }
    }

    /// Registers a node. Re-registering a location replaces its backend and resets its state.
    pub fn register(
        &self,
        location: impl Into<String>,
        tier: NodeTier,
        backend: Arc<dyn NodeBackend>,
    ) -> NodeRef {
        let location = location.into();
        let node = Arc::new(RegisteredNode::new(
            location.clone(),
            tier,
            backend,
            self.thresholds,
        ));

        let mut inner = self.inner.write();
        if inner.nodes.insert(location.clone(), node.clone()).is_some() {
            warn!(node = %location, "Replacing registered cache node");
        } else {
            inner.order.push(location.clone());
            info!(node = %location, tier = %tier, "Registered cache node");
        }

        node
    }

    pub fn get(&self, location: &str) -> Option<NodeRef> {
        self.inner.read().nodes.get(location).cloned()
    }

    /// All nodes in registration order, optionally restricted to one tier.
    pub fn all(&self, tier: Option<NodeTier>) -> Vec<NodeRef> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|loc| inner.nodes.get(loc))
            .filter(|node| tier.map_or(true, |t| node.tier == t))
            .cloned()
            .collect()
    }

    /// The first registered origin node.
    pub fn origin(&self) -> Option<NodeRef> {
        self.all(Some(NodeTier::Origin)).into_iter().next()
    }

    /// Node by tier and zone, following the `{tier}-{zone}` naming convention.
    pub fn find(&self, tier: NodeTier, zone: &str) -> Option<NodeRef> {
        self.get(&tier.location_for(zone))
            .filter(|node| node.tier == tier)
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds a call outcome into a node's metrics. Unknown locations are ignored.
    pub fn record_outcome(&self, location: &str, outcome: NodeOutcome) {
        if let Some(node) = self.get(location) {
            node.apply(&outcome);
        }
    }

    /// Records a health check result. Returns the new status on a transition.
    pub fn record_health(&self, location: &str, healthy: bool) -> Option<NodeStatus> {
        let node = self.get(location)?;
        let transition = node.state.lock().health.record(healthy).map(status_from);

        if let Some(status) = transition {
            match status {
                NodeStatus::Active => info!(node = %location, "Cache node recovered"),
                NodeStatus::Degraded => warn!(node = %location, "Cache node degraded"),
                NodeStatus::Failed => warn!(node = %location, "Cache node failed"),
            }
        }

        transition
    }

    pub fn snapshots(&self) -> Vec<CacheNode> {
        self.all(None).iter().map(|n| n.snapshot()).collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}
