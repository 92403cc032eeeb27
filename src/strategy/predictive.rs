// Prediction-driven strategy

use super::{usable, CacheStrategy, SmartStrategy, StrategyContext, StrategyKind};
use crate::config::StrategyConfig;
use crate::edge::{NodeRef, NodeRegistry};
use crate::prediction::PredictiveEngine;
use std::sync::Arc;

/// Pins predicted-hot paths to the global edge; everything else is `smart`.
pub struct PredictiveStrategy {
    config: Arc<StrategyConfig>,
    smart: SmartStrategy,
    engine: Arc<PredictiveEngine>,
}

impl PredictiveStrategy {
    pub fn new(config: Arc<StrategyConfig>, smart: SmartStrategy, engine: Arc<PredictiveEngine>) -> Self {
        Self {
            config,
            smart,
            engine,
        }
    }

    fn is_predicted(&self, path: &str) -> bool {
        let threshold = self.config.predictive_confidence_threshold;
        self.engine
            .current()
            .iter()
            .any(|p| !p.path.is_empty() && path.contains(p.path.as_str()) && p.confidence > threshold)
    }
}

impl CacheStrategy for PredictiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Predictive
    }

    fn select_nodes(&self, path: &str, ctx: &StrategyContext, registry: &NodeRegistry) -> Vec<NodeRef> {
        if self.is_predicted(path) {
            if let Some(global) = usable(registry.get(&self.config.global_edge)) {
                return vec![global];
            }
        }

        self.smart.select_nodes(path, ctx, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::Prediction;
    use crate::strategy::test_support::{names, standard};
    use crate::strategy::Operation;

    fn strategy(engine: Arc<PredictiveEngine>) -> (PredictiveStrategy, SmartStrategy) {
        let config = Arc::new(StrategyConfig::default());
        let smart = SmartStrategy::new(config.clone());
        (PredictiveStrategy::new(config, smart.clone(), engine), smart)
    }

    #[test]
    fn test_empty_predictions_match_smart() {
        let registry = standard();
        let (predictive, smart) = strategy(Arc::new(PredictiveEngine::default()));

        for path in ["/static/app.js", "/api/orders", "/index.html"] {
            let ctx = StrategyContext::new("us-east", Operation::Read);
            assert_eq!(
                names(&predictive.select_nodes(path, &ctx, &registry)),
                names(&smart.select_nodes(path, &ctx, &registry)),
            );
        }
    }

    #[test]
    fn test_confident_prediction_pins_global_edge() {
        let registry = standard();
        let engine = Arc::new(PredictiveEngine::default());
        engine.publish(vec![Prediction::new("/app.js", 60, 0.9)]);
        let (predictive, _) = strategy(engine);

        let ctx = StrategyContext::new("us-east", Operation::Write);
        assert_eq!(
            names(&predictive.select_nodes("/static/app.js", &ctx, &registry)),
            vec!["edge-global"]
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let registry = standard();
        let engine = Arc::new(PredictiveEngine::default());
        engine.publish(vec![
            Prediction::new("/static/app.js", 60, 0.7),
            Prediction::new("", 60, 1.0),
        ]);
        let (predictive, _) = strategy(engine);

        let ctx = StrategyContext::new("us-east", Operation::Write);
        assert_eq!(
            names(&predictive.select_nodes("/static/app.js", &ctx, &registry)),
            vec!["edge-us-east", "origin"]
        );
    }
}
