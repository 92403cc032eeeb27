// Rolling cache metrics

use crate::observability;
use crate::strategy::StrategyKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const EMA_DECAY: f64 = 0.9;

/// Hit rate in percent, zero when nothing was looked up.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let lookups = hits + misses;
    if lookups == 0 {
        0.0
    } else {
        hits as f64 / lookups as f64 * 100.0
    }
}

/// Global counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_cache_operations: u64,
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub average_response_time_ema_ms: f64,
    pub cache_warming_operations: u64,
    pub writes: u64,
    pub invalidations: u64,
}

/// Counters for one strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub operations: u64,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub average_response_time_ema_ms: f64,
}

#[derive(Default)]
struct Inner {
    global: GlobalMetrics,
    strategies: HashMap<StrategyKind, StrategyMetrics>,
}

/// Aggregates operation outcomes. Per-node metrics live in the node registry.
#[derive(Default)]
pub struct MetricsAggregator {
    inner: Mutex<Inner>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&self, strategy: StrategyKind, hit: bool, response_time_ms: f64) {
        let rate = {
            let mut inner = self.inner.lock();
            inner.global.total_lookups += 1;
            if hit {
                inner.global.cache_hits += 1;
            } else {
                inner.global.cache_misses += 1;
            }
            inner.global.cache_hit_rate = hit_rate(inner.global.cache_hits, inner.global.cache_misses);

            let entry = inner.strategies.entry(strategy).or_default();
            entry.lookups += 1;
            if hit {
                entry.hits += 1;
            } else {
                entry.misses += 1;
            }
            entry.hit_rate = hit_rate(entry.hits, entry.misses);

            Self::operation(&mut inner, strategy, response_time_ms);
            inner.global.cache_hit_rate
        };

        observability::record_lookup(strategy.as_str(), hit);
        observability::update_hit_rate(rate);
    }

    pub fn record_write(&self, strategy: StrategyKind, cached_nodes: usize, bytes: u64, response_time_ms: f64) {
        {
            let mut inner = self.inner.lock();
            inner.global.writes += 1;
            Self::operation(&mut inner, strategy, response_time_ms);
        }
        observability::record_write(strategy.as_str(), cached_nodes, bytes);
    }

    pub fn record_invalidation(&self, strategy: StrategyKind, entries: u64, response_time_ms: f64) {
        {
            let mut inner = self.inner.lock();
            inner.global.invalidations += entries;
            Self::operation(&mut inner, strategy, response_time_ms);
        }
        observability::record_invalidation(entries);
    }

    pub fn record_warmup(&self, warmed: usize) {
        self.inner.lock().global.cache_warming_operations += warmed as u64;
        observability::record_warmup(warmed);
    }

    fn operation(inner: &mut Inner, strategy: StrategyKind, response_time_ms: f64) {
        let global = &mut inner.global;
        global.total_cache_operations += 1;
        global.average_response_time_ema_ms =
            global.average_response_time_ema_ms * EMA_DECAY + response_time_ms * (1.0 - EMA_DECAY);

        let entry = inner.strategies.entry(strategy).or_default();
        entry.operations += 1;
        entry.average_response_time_ema_ms =
            entry.average_response_time_ema_ms * EMA_DECAY + response_time_ms * (1.0 - EMA_DECAY);
    }

    pub fn global(&self) -> GlobalMetrics {
        self.inner.lock().global.clone()
    }

    pub fn strategies(&self) -> HashMap<StrategyKind, StrategyMetrics> {
        self.inner.lock().strategies.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hit_rate_is_zero() {
        let metrics = MetricsAggregator::new();
        assert_eq!(metrics.global().cache_hit_rate, 0.0);
        assert_eq!(hit_rate(0, 0), 0.0);
    }

    #[test]
    fn test_lookup_invariant() {
        let metrics = MetricsAggregator::new();
        for hit in [true, false, true, true, false, false, true] {
            metrics.record_lookup(StrategyKind::Smart, hit, 2.0);
        }

        let global = metrics.global();
        assert_eq!(global.cache_hits + global.cache_misses, global.total_lookups);
        let expected = global.cache_hits as f64 / global.total_lookups as f64 * 100.0;
        assert!((global.cache_hit_rate - expected).abs() < 1e-9);
    }

    #[test]
    fn test_per_strategy_counters() {
        let metrics = MetricsAggregator::new();
        metrics.record_lookup(StrategyKind::Smart, true, 1.0);
        metrics.record_lookup(StrategyKind::Tiered, false, 1.0);
        metrics.record_write(StrategyKind::Smart, 2, 100, 5.0);
        metrics.record_invalidation(StrategyKind::Tiered, 3, 1.0);
        metrics.record_warmup(4);

        let strategies = metrics.strategies();
        assert_eq!(strategies[&StrategyKind::Smart].operations, 2);
        assert_eq!(strategies[&StrategyKind::Smart].hit_rate, 100.0);
        assert_eq!(strategies[&StrategyKind::Tiered].misses, 1);

        let global = metrics.global();
        assert_eq!(global.total_cache_operations, 4);
        assert_eq!(global.writes, 1);
        assert_eq!(global.invalidations, 3);
        assert_eq!(global.cache_warming_operations, 4);
    }

    #[test]
    fn test_response_time_ema() {
        let metrics = MetricsAggregator::new();
        metrics.record_write(StrategyKind::Smart, 1, 1, 100.0);
        assert!((metrics.global().average_response_time_ema_ms - 10.0).abs() < 1e-9);
    }
}
