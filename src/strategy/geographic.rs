// Region-table strategy

use super::{usable, CacheStrategy, StrategyContext, StrategyKind};
use crate::config::StrategyConfig;
use crate::edge::{NodeRef, NodeRegistry, NodeTier};
use std::sync::Arc;

/// Maps the caller's coarse location to a regional node, then the origin.
pub struct GeographicStrategy {
    config: Arc<StrategyConfig>,
}

impl GeographicStrategy {
    pub fn new(config: Arc<StrategyConfig>) -> Self {
        Self { config }
    }
}

impl CacheStrategy for GeographicStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Geographic
    }

    fn select_nodes(&self, _path: &str, ctx: &StrategyContext, registry: &NodeRegistry) -> Vec<NodeRef> {
        let region = self.config.region_for(&ctx.user_location);

        let mut nodes = Vec::with_capacity(2);
        nodes.extend(usable(registry.find(NodeTier::Regional, region)));
        nodes.extend(usable(registry.origin()));
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{names, standard};
    use crate::strategy::Operation;

    fn geo() -> GeographicStrategy {
        GeographicStrategy::new(Arc::new(StrategyConfig::default()))
    }

    #[test]
    fn test_mapped_location() {
        let registry = standard();
        let ctx = StrategyContext::new("eu", Operation::Read);
        assert_eq!(
            names(&geo().select_nodes("/a", &ctx, &registry)),
            vec!["regional-eu-west-1", "origin"]
        );
    }

    #[test]
    fn test_unmapped_location_uses_default_region() {
        let registry = standard();
        let ctx = StrategyContext::new("mars", Operation::Read);
        assert_eq!(
            names(&geo().select_nodes("/a", &ctx, &registry)),
            vec!["regional-us-east-1", "origin"]
        );
    }

    #[test]
    fn test_unregistered_region_dropped() {
        let registry = standard();
        let ctx = StrategyContext::new("asia", Operation::Read);
        assert_eq!(names(&geo().select_nodes("/a", &ctx, &registry)), vec!["origin"]);
    }
}
