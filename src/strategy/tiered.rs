// Tier-walk strategy

use super::{usable, CacheStrategy, Operation, StrategyContext, StrategyKind};
use crate::config::StrategyConfig;
use crate::edge::{NodeRef, NodeRegistry, NodeTier};
use std::sync::Arc;

/// Walks the tiers closest-first: edge, regional (reads only), origin.
pub struct TieredStrategy {
    config: Arc<StrategyConfig>,
}

impl TieredStrategy {
    pub fn new(config: Arc<StrategyConfig>) -> Self {
        Self { config }
    }
}

impl CacheStrategy for TieredStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Tiered
    }

    fn select_nodes(&self, _path: &str, ctx: &StrategyContext, registry: &NodeRegistry) -> Vec<NodeRef> {
        let mut nodes = Vec::with_capacity(3);

        if ctx.includes(NodeTier::Edge) {
            nodes.extend(usable(registry.find(NodeTier::Edge, &ctx.user_location)));
        }
        if ctx.operation == Operation::Read {
            let region = self.config.region_for(&ctx.user_location);
            nodes.extend(usable(registry.find(NodeTier::Regional, region)));
        }
        if ctx.includes(NodeTier::Origin) {
            nodes.extend(usable(registry.origin()));
        }

        nodes
    }
}
