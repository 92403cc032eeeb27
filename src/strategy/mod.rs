//! Cache placement strategies.
//!
//! A strategy turns a content path plus call context into an ordered list of
//! candidate nodes. Order is read priority (first hit wins) and write fan-out order.
//!
//! | Strategy     | Candidates                                                   |
//! |--------------|--------------------------------------------------------------|
//! | `tiered`     | edge (if requested), regional (reads only), origin           |
//! | `smart`      | edge for static assets, regional for APIs, origin always     |
//! | `predictive` | global edge for predicted-hot paths, otherwise `smart`       |
//! | `geographic` | regional node for the caller's region, origin                |

pub mod geographic;
pub mod predictive;
pub mod smart;
pub mod tiered;

pub use geographic::GeographicStrategy;
pub use predictive::PredictiveStrategy;
pub use smart::SmartStrategy;
pub use tiered::TieredStrategy;

use crate::config::StrategyConfig;
use crate::edge::{NodeRef, NodeRegistry, NodeStatus, NodeTier, Priority};
use crate::error::{EdgeError, Result};
use crate::prediction::PredictiveEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Named placement policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Tiered,
    #[default]
    Smart,
    Predictive,
    Geographic,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Tiered,
        StrategyKind::Smart,
        StrategyKind::Predictive,
        StrategyKind::Geographic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Tiered => "tiered",
            StrategyKind::Smart => "smart",
            StrategyKind::Predictive => "predictive",
            StrategyKind::Geographic => "geographic",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiered" => Ok(StrategyKind::Tiered),
            "smart" => Ok(StrategyKind::Smart),
            "predictive" => Ok(StrategyKind::Predictive),
            "geographic" => Ok(StrategyKind::Geographic),
            _ => Err(EdgeError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Cache operation being planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Invalidate,
}

/// Call context handed to a strategy.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub user_location: String,
    /// Tiers the caller allows.
    pub cache_levels: Vec<NodeTier>,
    pub operation: Operation,
    pub priority: Priority,
}

impl StrategyContext {
    pub fn new(user_location: impl Into<String>, operation: Operation) -> Self {
        Self {
            user_location: user_location.into(),
            cache_levels: NodeTier::ALL.to_vec(),
            operation,
            priority: Priority::Normal,
        }
    }

    pub fn with_levels(mut self, levels: Vec<NodeTier>) -> Self {
        self.cache_levels = levels;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn includes(&self, tier: NodeTier) -> bool {
        self.cache_levels.contains(&tier)
    }
}

/// Placement policy.
pub trait CacheStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Ordered candidate nodes for a path. Missing nodes are dropped, never an error.
    fn select_nodes(&self, path: &str, ctx: &StrategyContext, registry: &NodeRegistry)
        -> Vec<NodeRef>;
}

/// Looks up a node and drops it when it is failed. The origin is always kept.
pub(crate) fn usable(node: Option<NodeRef>) -> Option<NodeRef> {
    node.filter(|n| n.tier() == NodeTier::Origin || n.status() != NodeStatus::Failed)
}

/// Result of strategy resolution.
#[derive(Clone)]
pub struct Resolution {
    /// Strategy that actually produced the nodes.
    pub strategy: StrategyKind,
    pub nodes: Vec<NodeRef>,
}

impl Resolution {
    pub fn locations(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.location().to_string()).collect()
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("strategy", &self.strategy)
            .field("nodes", &self.locations())
            .finish()
    }
}

/// Picks a strategy by name and resolves candidates, falling back to `smart`.
pub struct StrategyResolver {
    registry: Arc<NodeRegistry>,
    strategies: HashMap<StrategyKind, Arc<dyn CacheStrategy>>,
    default: StrategyKind,
}

impl StrategyResolver {
    /// Resolver with the four built-in strategies.
    pub fn new(
        config: &StrategyConfig,
        default: StrategyKind,
        registry: Arc<NodeRegistry>,
        engine: Arc<PredictiveEngine>,
    ) -> Self {
        let config = Arc::new(config.clone());
        let smart = SmartStrategy::new(config.clone());

        let mut strategies: HashMap<StrategyKind, Arc<dyn CacheStrategy>> = HashMap::new();
        strategies.insert(StrategyKind::Tiered, Arc::new(TieredStrategy::new(config.clone())));
        strategies.insert(
            StrategyKind::Predictive,
            Arc::new(PredictiveStrategy::new(config.clone(), smart.clone(), engine)),
        );
        strategies.insert(
            StrategyKind::Geographic,
            Arc::new(GeographicStrategy::new(config)),
        );
        strategies.insert(StrategyKind::Smart, Arc::new(smart));

        Self {
            registry,
            strategies,
            default,
        }
    }

    pub fn default_kind(&self) -> StrategyKind {
        self.default
    }

    /// Resolves candidates. Unknown names and empty candidate lists fall back to
    /// `smart`; only an empty `smart` list is an error.
    pub fn resolve(&self, name: Option<&str>, path: &str, ctx: &StrategyContext) -> Result<Resolution> {
        let requested = match name {
            None => self.default,
            Some(name) => match name.parse::<StrategyKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(strategy = %name, error = %e, "Falling back to smart strategy");
                    StrategyKind::Smart
                }
            },
        };

        if requested != StrategyKind::Smart {
            let nodes = self.select(requested, path, ctx);
            if !nodes.is_empty() {
                debug!(strategy = %requested, path = %path, candidates = nodes.len(), "Resolved nodes");
                return Ok(Resolution {
                    strategy: requested,
                    nodes,
                });
            }
            warn!(strategy = %requested, path = %path, "No candidates, falling back to smart strategy");
        }

        let nodes = self.select(StrategyKind::Smart, path, ctx);
        if nodes.is_empty() {
            return Err(EdgeError::NoCandidates(path.to_string()));
        }

        debug!(strategy = "smart", path = %path, candidates = nodes.len(), "Resolved nodes");
        Ok(Resolution {
            strategy: StrategyKind::Smart,
            nodes,
        })
    }

    fn select(&self, kind: StrategyKind, path: &str, ctx: &StrategyContext) -> Vec<NodeRef> {
        self.strategies
            .get(&kind)
            .map(|s| s.select_nodes(path, ctx, &self.registry))
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::edge::MemoryNode;

    pub fn topology(locations: &[(&str, NodeTier)]) -> NodeRegistry {
        let registry = NodeRegistry::default();
        for (location, tier) in locations {
            registry.register(*location, *tier, Arc::new(MemoryNode::new(*location, 1024)));
        }
        registry
    }

    pub fn standard() -> NodeRegistry {
        topology(&[
            ("edge-us-east", NodeTier::Edge),
            ("edge-global", NodeTier::Edge),
            ("regional-us-east-1", NodeTier::Regional),
            ("regional-eu-west-1", NodeTier::Regional),
            ("origin", NodeTier::Origin),
        ])
    }

    pub fn names(nodes: &[NodeRef]) -> Vec<&str> {
        nodes.iter().map(|n| n.location()).collect()
    }
}
