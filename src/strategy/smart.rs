// Path-pattern strategy

use super::{usable, CacheStrategy, StrategyContext, StrategyKind};
use crate::config::StrategyConfig;
use crate::edge::{NodeRef, NodeRegistry, NodeTier};
use std::sync::Arc;

/// Static assets go to the caller's edge, API responses to the caller's region,
/// and the origin is always the last candidate.
#[derive(Clone)]
pub struct SmartStrategy {
    config: Arc<StrategyConfig>,
}

impl SmartStrategy {
    pub fn new(config: Arc<StrategyConfig>) -> Self {
        Self { config }
    }

    fn is_static(path: &str) -> bool {
        path.contains("/static/") || path.contains("/assets/")
    }

    fn is_api(path: &str) -> bool {
        path.contains("/api/")
    }
}

impl CacheStrategy for SmartStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Smart
    }

    fn select_nodes(&self, path: &str, ctx: &StrategyContext, registry: &NodeRegistry) -> Vec<NodeRef> {
        let mut nodes = Vec::with_capacity(2);

        if Self::is_static(path) && ctx.includes(NodeTier::Edge) {
            nodes.extend(usable(registry.find(NodeTier::Edge, &ctx.user_location)));
        } else if Self::is_api(path) && ctx.includes(NodeTier::Regional) {
            let region = self.config.region_for(&ctx.user_location);
            nodes.extend(usable(registry.find(NodeTier::Regional, region)));
        }

        nodes.extend(usable(registry.origin()));
        nodes
    }
}
