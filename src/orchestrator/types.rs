// Orchestrator options and results

use crate::aggregator::{GlobalMetrics, StrategyMetrics};
use crate::edge::{CacheNode, NodeStatus, NodeTier, Priority};
use crate::prediction::{ModelStats, Prediction};
use crate::provider::{HealthCheckReport, InvalidationReport, ProviderStatus, UploadResponse};
use crate::strategy::StrategyKind;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Options for [`cache_content`](super::EdgeCacheOrchestrator::cache_content).
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Strategy name; the configured default when absent.
    pub strategy: Option<String>,
    /// Overrides cache rules and the configured default.
    pub ttl_secs: Option<u64>,
    pub priority: Priority,
    pub user_location: Option<String>,
    /// All tiers when absent.
    pub cache_levels: Option<Vec<NodeTier>>,
    /// Also upload through the active CDN provider.
    pub publish: bool,
    pub content_type: Option<String>,
}

impl CacheOptions {
    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    pub fn levels(mut self, levels: Vec<NodeTier>) -> Self {
        self.cache_levels = Some(levels);
        self
    }

    pub fn location(mut self, user_location: impl Into<String>) -> Self {
        self.user_location = Some(user_location.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn publish(mut self) -> Self {
        self.publish = true;
        self
    }
}

/// A node call that failed or timed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node: String,
    pub error: String,
}

/// Provider upload attached to a cache write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub response: Option<UploadResponse>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheOutcome {
    pub path: String,
    pub strategy: StrategyKind,
    pub cached_nodes: usize,
    pub total_nodes: usize,
    pub response_time_ms: f64,
    /// Nodes that stored the entry, in strategy order.
    pub nodes: Vec<String>,
    pub failures: Vec<NodeFailure>,
    pub upload: Option<PublishOutcome>,
}

/// Options for [`get_content`](super::EdgeCacheOrchestrator::get_content).
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub strategy: Option<String>,
    pub user_location: Option<String>,
    pub fallback_levels: Option<Vec<NodeTier>>,
}

impl GetOptions {
    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn location(mut self, user_location: impl Into<String>) -> Self {
        self.user_location = Some(user_location.into());
        self
    }

    pub fn levels(mut self, levels: Vec<NodeTier>) -> Self {
        self.fallback_levels = Some(levels);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GetOutcome {
    pub path: String,
    pub content: Option<Bytes>,
    /// Node that served the hit.
    pub node: Option<String>,
    pub strategy: StrategyKind,
    pub response_time_ms: f64,
    pub hit: bool,
    /// Candidates probed; only set on a miss.
    pub searched_nodes: Option<usize>,
}

/// Options for [`invalidate_content`](super::EdgeCacheOrchestrator::invalidate_content).
#[derive(Debug, Clone)]
pub struct InvalidateOptions {
    pub strategy: Option<String>,
    pub recursive: bool,
    /// Include edge nodes.
    pub propagate_to_edges: bool,
    /// All tiers when absent.
    pub cache_levels: Option<Vec<NodeTier>>,
    /// Also purge through the provider gateway.
    pub purge_providers: bool,
}

impl Default for InvalidateOptions {
    fn default() -> Self {
        Self {
            strategy: None,
            recursive: false,
            propagate_to_edges: true,
            cache_levels: None,
            purge_providers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPurge {
    pub report: Option<InvalidationReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateOutcome {
    /// Paths after rule expansion.
    pub paths: Vec<String>,
    pub strategy: StrategyKind,
    /// Nodes that processed the invalidation.
    pub nodes_invalidated: usize,
    /// Entries removed across all nodes.
    pub total_invalidations: u64,
    pub duration_ms: f64,
    pub failures: Vec<NodeFailure>,
    pub provider: Option<ProviderPurge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupStatus {
    Warmed,
    /// Already in flight for this path.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupResult {
    pub path: String,
    pub status: WarmupStatus,
    pub cached_nodes: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupOutcome {
    pub predictions: usize,
    pub warmed: usize,
    pub duration_ms: f64,
    pub results: Vec<WarmupResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Node,
    Tier,
}

/// Options for [`get_cache_analytics`](super::EdgeCacheOrchestrator::get_cache_analytics).
#[derive(Debug, Clone, Default)]
pub struct AnalyticsOptions {
    /// Label echoed back; counters cover the process lifetime.
    pub time_range: Option<String>,
    pub group_by: GroupBy,
    pub include_predictions: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierSummary {
    pub nodes: usize,
    pub active: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub bandwidth_bytes: u64,
    pub average_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub model: ModelStats,
    pub current: Vec<Prediction>,
    pub warmups_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheAnalytics {
    pub time_range: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub overview: GlobalMetrics,
    pub nodes: Vec<CacheNode>,
    pub tiers: Option<HashMap<NodeTier, TierSummary>>,
    pub predictions: Option<PredictionSummary>,
    pub strategies: HashMap<StrategyKind, StrategyMetrics>,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealthReport {
    pub node: String,
    pub healthy: bool,
    pub status: NodeStatus,
}

/// Result of one health-check pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub nodes: Vec<NodeHealthReport>,
    pub providers: Vec<HealthCheckReport>,
}
