//! Edge cache orchestrator.
//!
//! The façade over the node registry, strategy resolver, provider gateway and
//! predictive engine. Every node and provider call carries its own timeout and a
//! failed call only removes that node from the operation's result; partial success
//! is reported through counts, never as an error.
//!
//! ```text
//!   request ──▶ StrategyResolver ──▶ ordered nodes ──▶ node calls ──▶ MetricsAggregator
//!                                                         │
//!                                    writes/invalidations: concurrent fan-out
//!                                    reads: sequential, first hit wins
//! ```

pub mod background;
pub mod types;

pub use background::BackgroundTasks;
pub use types::*;

use crate::aggregator::MetricsAggregator;
use crate::config::EdgeweaveConfig;
use crate::edge::{CacheEntry, NodeOutcome, NodeRegistry, NodeStatus, NodeTier, Priority};
use crate::error::{EdgeError, Result};
use crate::events::{CacheEventKind, EventBus};
use crate::observability;
use crate::prediction::{
    AccessLog, ContentSource, MemoryAccessLog, NodeContentSource, Prediction, PredictiveEngine,
    TrainingOutcome,
};
use crate::provider::{
    CacheRule, GatewayConfig, InvalidationRule, ProviderAnalytics, ProviderGateway, SwitchRecord,
    UploadRequest,
};
use crate::resilience::{with_timeout, HealthThresholds};
use crate::strategy::{Operation, StrategyContext, StrategyKind, StrategyResolver};
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Claim on a path in the warmup queue, released on drop.
struct WarmupGuard<'a> {
    queue: &'a Mutex<HashSet<String>>,
    path: String,
}

impl<'a> WarmupGuard<'a> {
    fn acquire(queue: &'a Mutex<HashSet<String>>, path: &str) -> Option<Self> {
        queue.lock().insert(path.to_string()).then(|| Self {
            queue,
            path: path.to_string(),
        })
    }
}

impl Drop for WarmupGuard<'_> {
    fn drop(&mut self) {
        self.queue.lock().remove(&self.path);
    }
}

/// Builder for [`EdgeCacheOrchestrator`]. Every collaborator is optional.
pub struct OrchestratorBuilder {
    config: EdgeweaveConfig,
    registry: Option<Arc<NodeRegistry>>,
    gateway: Option<Arc<ProviderGateway>>,
    engine: Option<Arc<PredictiveEngine>>,
    content_source: Option<Arc<dyn ContentSource>>,
    access_log: Option<Arc<dyn AccessLog>>,
    events: Option<Arc<EventBus>>,
}

impl OrchestratorBuilder {
    pub fn new(config: EdgeweaveConfig) -> Self {
        Self {
            config,
            registry: None,
            gateway: None,
            engine: None,
            content_source: None,
            access_log: None,
            events: None,
        }
    }

    pub fn registry(mut self, registry: Arc<NodeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn gateway(mut self, gateway: Arc<ProviderGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn engine(mut self, engine: Arc<PredictiveEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn content_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.content_source = Some(source);
        self
    }

    pub fn access_log(mut self, log: Arc<dyn AccessLog>) -> Self {
        self.access_log = Some(log);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<EdgeCacheOrchestrator> {
        self.config.validate()?;
        let config = self.config;

        let registry = self.registry.unwrap_or_else(|| {
            Arc::new(NodeRegistry::new(HealthThresholds {
                down_after: config.health.node_fail_after,
                recover_after: config.health.recover_after,
            }))
        });
        let events = self.events.unwrap_or_default();
        let gateway = self.gateway.unwrap_or_else(|| {
            Arc::new(ProviderGateway::new(
                GatewayConfig::from_config(&config),
                events.clone(),
            ))
        });
        let engine = self.engine.unwrap_or_default();
        let content_source: Arc<dyn ContentSource> = match self.content_source {
            Some(source) => source,
            None => Arc::new(NodeContentSource::new(
                registry.clone(),
                config.orchestrator.node_timeout,
            )),
        };
        let access_log: Arc<dyn AccessLog> = match self.access_log {
            Some(log) => log,
            None => Arc::new(MemoryAccessLog::new(config.orchestrator.access_log_capacity)),
        };

        let resolver = StrategyResolver::new(
            &config.strategy,
            config.orchestrator.default_strategy,
            registry.clone(),
            engine.clone(),
        );

        Ok(EdgeCacheOrchestrator {
            config,
            registry,
            resolver,
            gateway,
            engine,
            content_source,
            access_log,
            metrics: MetricsAggregator::new(),
            events,
            warmup_queue: Mutex::new(HashSet::new()),
        })
    }
}

/// Cache orchestration façade.
pub struct EdgeCacheOrchestrator {
    config: EdgeweaveConfig,
    registry: Arc<NodeRegistry>,
    resolver: StrategyResolver,
    gateway: Arc<ProviderGateway>,
    engine: Arc<PredictiveEngine>,
    content_source: Arc<dyn ContentSource>,
    access_log: Arc<dyn AccessLog>,
    metrics: MetricsAggregator,
    events: Arc<EventBus>,
    warmup_queue: Mutex<HashSet<String>>,
}

impl EdgeCacheOrchestrator {
    pub fn builder(config: EdgeweaveConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &EdgeweaveConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<ProviderGateway> {
        &self.gateway
    }

    pub fn engine(&self) -> &Arc<PredictiveEngine> {
        &self.engine
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    /// Paths with a warmup in flight.
    pub fn warmups_in_flight(&self) -> usize {
        self.warmup_queue.lock().len()
    }

    fn user_location(&self, location: Option<String>) -> String {
        location.unwrap_or_else(|| self.config.orchestrator.default_user_location.clone())
    }

    fn node_timeout(&self) -> Duration {
        self.config.orchestrator.node_timeout
    }

    fn strategy_kind(&self, name: Option<&str>) -> StrategyKind {
        match name {
            None => self.resolver.default_kind(),
            Some(name) => name.parse().unwrap_or_else(|_| {
                warn!(strategy = %name, "Unknown strategy, reporting as smart");
                StrategyKind::Smart
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Writes content to every node the strategy selects.
    ///
    /// Fails only for an empty path, a zero TTL or when no candidate node exists.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn cache_content(
        &self,
        path: &str,
        content: Bytes,
        options: CacheOptions,
    ) -> Result<CacheOutcome> {
        if path.is_empty() {
            return Err(EdgeError::InvalidArgument("path cannot be empty".to_string()));
        }

        let ttl_secs = options
            .ttl_secs
            .or_else(|| self.gateway.cache_rules_for(path).ttl_secs)
            .unwrap_or(self.config.orchestrator.default_ttl_secs);
        if ttl_secs == 0 {
            return Err(EdgeError::InvalidArgument("TTL must be positive".to_string()));
        }

        let location = self.user_location(options.user_location);
        let ctx = StrategyContext::new(location.clone(), Operation::Write)
            .with_levels(options.cache_levels.unwrap_or_else(|| NodeTier::ALL.to_vec()))
            .with_priority(options.priority);
        let resolution = self.resolver.resolve(options.strategy.as_deref(), path, &ctx)?;

        let ttl = Duration::from_secs(ttl_secs);
        let entries = resolution
            .nodes
            .iter()
            .map(|node| {
                CacheEntry::new(path, content.clone(), ttl, node.tier())
                    .map(|entry| (node.clone(), entry.with_priority(options.priority)))
            })
            .collect::<Result<Vec<_>>>()?;

        let started = Instant::now();
        let timeout = self.node_timeout();
        let writes = entries.into_iter().map(|(node, entry)| async move {
            let call = Instant::now();
            let result = with_timeout(timeout, node.backend().store(entry)).await;
            (node, result, elapsed_ms(call))
        });
        let results = join_all(writes).await;

        let bytes = content.len() as u64;
        let mut nodes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (node, result, ms) in results {
            observability::record_node_latency(node.location(), ms);
            match result {
                Ok(()) => {
                    self.registry
                        .record_outcome(node.location(), NodeOutcome::write(ms, bytes));
                    nodes.push(node.location().to_string());
                }
                Err(e) => {
                    self.registry.record_outcome(node.location(), NodeOutcome::failure(ms));
                    warn!(node = %node.location(), path = %path, error = %e, "Cache write failed");
                    self.events.emit(
                        CacheEventKind::CacheError,
                        json!({ "path": path, "node": node.location(), "error": e.to_string() }),
                    );
                    failures.push(NodeFailure {
                        node: node.location().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let upload = if options.publish {
            Some(self.publish(path, content, options.content_type, &location).await)
        } else {
            None
        };

        let response_time_ms = elapsed_ms(started);
        self.metrics
            .record_write(resolution.strategy, nodes.len(), bytes, response_time_ms);

        let outcome = CacheOutcome {
            path: path.to_string(),
            strategy: resolution.strategy,
            cached_nodes: nodes.len(),
            total_nodes: resolution.nodes.len(),
            response_time_ms,
            nodes,
            failures,
            upload,
        };

        if outcome.cached_nodes > 0 {
            self.events.emit(
                CacheEventKind::ContentCached,
                json!({
                    "path": path,
                    "strategy": outcome.strategy,
                    "nodes": outcome.nodes,
                    "ttl_secs": ttl_secs,
                }),
            );
        }
        debug!(
            strategy = %outcome.strategy,
            cached = outcome.cached_nodes,
            total = outcome.total_nodes,
            "Content cached"
        );

        Ok(outcome)
    }

    async fn publish(
        &self,
        path: &str,
        content: Bytes,
        content_type: Option<String>,
        location: &str,
    ) -> PublishOutcome {
        let mut request = UploadRequest::new(path, content);
        request.content_type = content_type;
        request.region = Some(self.config.strategy.region_for(location).to_string());

        match self.gateway.upload(request).await {
            Ok(response) => PublishOutcome {
                response: Some(response),
                error: None,
            },
            Err(e) => {
                warn!(path = %path, error = %e, "Provider upload failed");
                self.events.emit(
                    CacheEventKind::CacheError,
                    json!({ "path": path, "provider": self.gateway.active(), "error": e.to_string() }),
                );
                PublishOutcome {
                    response: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Uploads assets through the active provider with bounded concurrency.
    pub async fn publish_assets(
        &self,
        requests: Vec<UploadRequest>,
    ) -> Result<Vec<crate::provider::BatchUpload>> {
        self.gateway.upload_batch(requests).await
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Probes candidates in strategy order and returns the first hit.
    ///
    /// A node error or empty content counts as a miss for that node; probing continues.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn get_content(&self, path: &str, options: GetOptions) -> Result<GetOutcome> {
        if path.is_empty() {
            return Err(EdgeError::InvalidArgument("path cannot be empty".to_string()));
        }

        let location = self.user_location(options.user_location);
        let ctx = StrategyContext::new(location.clone(), Operation::Read)
            .with_levels(options.fallback_levels.unwrap_or_else(|| NodeTier::ALL.to_vec()));
        let resolution = self.resolver.resolve(options.strategy.as_deref(), path, &ctx)?;

        let started = Instant::now();
        let mut found = None;
        for node in &resolution.nodes {
            let call = Instant::now();
            let result = with_timeout(self.node_timeout(), node.backend().fetch(path)).await;
            let ms = elapsed_ms(call);
            observability::record_node_latency(node.location(), ms);

            match result {
                Ok(Some(content)) if !content.is_empty() => {
                    self.registry.record_outcome(node.location(), NodeOutcome::read(ms, true));
                    found = Some((node.location().to_string(), content));
                    break;
                }
                Ok(_) => {
                    self.registry.record_outcome(node.location(), NodeOutcome::read(ms, false));
                }
                Err(e) => {
                    self.registry.record_outcome(node.location(), NodeOutcome::failure(ms));
                    warn!(node = %node.location(), path = %path, error = %e, "Cache read failed");
                    self.events.emit(
                        CacheEventKind::RetrievalError,
                        json!({ "path": path, "node": node.location(), "error": e.to_string() }),
                    );
                }
            }
        }

        let response_time_ms = elapsed_ms(started);
        let hit = found.is_some();
        self.metrics.record_lookup(resolution.strategy, hit, response_time_ms);
        self.access_log.record(path, &location).await;

        let outcome = match found {
            Some((node, content)) => {
                self.events.emit(
                    CacheEventKind::CacheHit,
                    json!({ "path": path, "node": node, "strategy": resolution.strategy }),
                );
                GetOutcome {
                    path: path.to_string(),
                    content: Some(content),
                    node: Some(node),
                    strategy: resolution.strategy,
                    response_time_ms,
                    hit: true,
                    searched_nodes: None,
                }
            }
            None => {
                self.events.emit(
                    CacheEventKind::CacheMiss,
                    json!({
                        "path": path,
                        "strategy": resolution.strategy,
                        "searched_nodes": resolution.nodes.len(),
                    }),
                );
                GetOutcome {
                    path: path.to_string(),
                    content: None,
                    node: None,
                    strategy: resolution.strategy,
                    response_time_ms,
                    hit: false,
                    searched_nodes: Some(resolution.nodes.len()),
                }
            }
        };

        Ok(outcome)
    }

    // ---------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------

    /// Invalidates paths on every node in the requested tiers and purges the
    /// active provider. Per-node and provider failures are folded into the outcome.
    #[instrument(skip_all, fields(paths = paths.len()))]
    pub async fn invalidate_content(
        &self,
        paths: &[String],
        options: InvalidateOptions,
    ) -> Result<InvalidateOutcome> {
        let strategy = self.strategy_kind(options.strategy.as_deref());
        let started = Instant::now();

        let paths: Vec<String> = paths.iter().filter(|p| !p.is_empty()).cloned().collect();
        if paths.is_empty() {
            return Ok(InvalidateOutcome {
                paths,
                strategy,
                nodes_invalidated: 0,
                total_invalidations: 0,
                duration_ms: elapsed_ms(started),
                failures: Vec::new(),
                provider: None,
            });
        }

        let plan = self.gateway.plan_invalidation(&paths, options.recursive);

        let mut levels = options.cache_levels.unwrap_or_else(|| NodeTier::ALL.to_vec());
        if !options.propagate_to_edges {
            levels.retain(|t| *t != NodeTier::Edge);
        }
        let targets: Vec<_> = self
            .registry
            .all(None)
            .into_iter()
            .filter(|node| levels.contains(&node.tier()))
            .collect();

        let timeout = self.node_timeout();
        let plan_paths = &plan.paths;
        let recursive = plan.recursive;
        let calls = targets.into_iter().map(|node| async move {
            let call = Instant::now();
            let result = with_timeout(timeout, node.backend().invalidate(plan_paths, recursive)).await;
            (node, result, elapsed_ms(call))
        });
        let results = join_all(calls).await;

        let mut nodes_invalidated = 0;
        let mut total_invalidations = 0;
        let mut failures = Vec::new();
        for (node, result, ms) in results {
            match result {
                Ok(count) => {
                    self.registry
                        .record_outcome(node.location(), NodeOutcome::invalidation(ms, count));
                    nodes_invalidated += 1;
                    total_invalidations += count;
                }
                Err(e) => {
                    self.registry.record_outcome(node.location(), NodeOutcome::failure(ms));
                    warn!(node = %node.location(), error = %e, "Invalidation failed");
                    self.events.emit(
                        CacheEventKind::InvalidationError,
                        json!({ "paths": plan.paths, "node": node.location(), "error": e.to_string() }),
                    );
                    failures.push(NodeFailure {
                        node: node.location().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let provider = if options.purge_providers && self.gateway.has_active() {
            Some(match self.gateway.invalidate(&plan.paths, plan.recursive).await {
                Ok(report) => ProviderPurge {
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    warn!(error = %e, "Provider purge failed");
                    self.events.emit(
                        CacheEventKind::InvalidationError,
                        json!({ "paths": plan.paths, "provider": self.gateway.active(), "error": e.to_string() }),
                    );
                    ProviderPurge {
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            })
        } else {
            None
        };

        let duration_ms = elapsed_ms(started);
        self.metrics
            .record_invalidation(strategy, total_invalidations, duration_ms);
        self.events.emit(
            CacheEventKind::ContentInvalidated,
            json!({
                "paths": plan.paths,
                "nodes_invalidated": nodes_invalidated,
                "total_invalidations": total_invalidations,
            }),
        );
        info!(
            paths = plan.paths.len(),
            nodes = nodes_invalidated,
            entries = total_invalidations,
            "Content invalidated"
        );

        Ok(InvalidateOutcome {
            paths: plan.paths,
            strategy,
            nodes_invalidated,
            total_invalidations,
            duration_ms,
            failures,
            provider,
        })
    }

    // ---------------------------------------------------------------------
    // Warmup
    // ---------------------------------------------------------------------

    /// Fetches and caches predicted content. A path already being warmed is skipped.
    pub async fn warmup_cache(&self, predictions: Vec<Prediction>) -> WarmupOutcome {
        let started = Instant::now();
        let total = predictions.len();

        let mut results = Vec::with_capacity(total);
        let mut claimed = Vec::with_capacity(total);
        for prediction in predictions {
            match WarmupGuard::acquire(&self.warmup_queue, &prediction.path) {
                Some(guard) => claimed.push((guard, prediction)),
                None => {
                    debug!(path = %prediction.path, "Warmup already in flight");
                    results.push(WarmupResult {
                        path: prediction.path,
                        status: WarmupStatus::Skipped,
                        cached_nodes: 0,
                        error: None,
                    });
                }
            }
        }

        let warmups = claimed
            .into_iter()
            .map(|(guard, prediction)| async move {
                let result = self.warm_one(&prediction).await;
                drop(guard);
                (prediction, result)
            });

        for (prediction, result) in join_all(warmups).await {
            let entry = match result {
                Ok(cached) if cached > 0 => WarmupResult {
                    path: prediction.path,
                    status: WarmupStatus::Warmed,
                    cached_nodes: cached,
                    error: None,
                },
                Ok(_) => WarmupResult {
                    path: prediction.path,
                    status: WarmupStatus::Failed,
                    cached_nodes: 0,
                    error: Some("no node accepted the write".to_string()),
                },
                Err(e) => {
                    warn!(path = %prediction.path, error = %e, "Warmup failed");
                    self.events.emit(
                        CacheEventKind::WarmupError,
                        json!({ "path": prediction.path, "error": e.to_string() }),
                    );
                    WarmupResult {
                        path: prediction.path,
                        status: WarmupStatus::Failed,
                        cached_nodes: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(entry);
        }

        let warmed = results
            .iter()
            .filter(|r| r.status == WarmupStatus::Warmed)
            .count();
        self.metrics.record_warmup(warmed);

        let outcome = WarmupOutcome {
            predictions: total,
            warmed,
            duration_ms: elapsed_ms(started),
            results,
        };

        self.events.emit(
            CacheEventKind::CacheWarmupCompleted,
            json!({ "predictions": total, "warmed": warmed, "duration_ms": outcome.duration_ms }),
        );
        info!(predictions = total, warmed, "Cache warmup completed");
        outcome
    }

    async fn warm_one(&self, prediction: &Prediction) -> Result<usize> {
        let content = self.content_source.fetch(prediction).await?;

        let mut options = CacheOptions::default()
            .strategy(StrategyKind::Predictive.as_str())
            .priority(Priority::High);
        if prediction.ttl_secs > 0 {
            options = options.ttl(prediction.ttl_secs);
        }

        let outcome = self.cache_content(&prediction.path, content, options).await?;
        Ok(outcome.cached_nodes)
    }

    // ---------------------------------------------------------------------
    // Analytics
    // ---------------------------------------------------------------------

    /// Read-only snapshot of metrics, nodes, providers and optionally predictions.
    pub fn get_cache_analytics(&self, options: AnalyticsOptions) -> CacheAnalytics {
        let nodes = self.registry.snapshots();

        let tiers = (options.group_by == GroupBy::Tier).then(|| {
            let mut tiers: HashMap<NodeTier, TierSummary> = HashMap::new();
            for node in &nodes {
                let summary = tiers.entry(node.tier).or_default();
                summary.nodes += 1;
                if node.status == NodeStatus::Active {
                    summary.active += 1;
                }
                summary.hits += node.metrics.hits;
                summary.misses += node.metrics.misses;
                summary.bandwidth_bytes += node.metrics.bandwidth_bytes;
                summary.average_response_time_ms += node.metrics.response_time_ema_ms;
            }
            for summary in tiers.values_mut() {
                summary.hit_rate = crate::aggregator::hit_rate(summary.hits, summary.misses);
                summary.average_response_time_ms /= summary.nodes.max(1) as f64;
            }
            tiers
        });

        let predictions = options.include_predictions.then(|| PredictionSummary {
            model: self.engine.stats(),
            current: self.engine.current().as_ref().clone(),
            warmups_in_flight: self.warmups_in_flight(),
        });

        CacheAnalytics {
            time_range: options.time_range,
            generated_at: Utc::now(),
            overview: self.metrics.global(),
            nodes,
            tiers,
            predictions,
            strategies: self.metrics.strategies(),
            providers: self.gateway.statuses(),
        }
    }

    // ---------------------------------------------------------------------
    // Rules and providers
    // ---------------------------------------------------------------------

    pub fn add_cache_rule(&self, pattern: &str, rule: CacheRule) -> Result<()> {
        self.gateway.add_cache_rule(pattern, rule)
    }

    pub fn add_invalidation_rule(&self, pattern: &str, rule: InvalidationRule) -> Result<()> {
        self.gateway.add_invalidation_rule(pattern, rule)
    }

    pub async fn switch_provider(&self, name: &str, reason: &str) -> Result<SwitchRecord> {
        self.gateway.switch_provider(name, reason).await
    }

    // ---------------------------------------------------------------------
    // Periodic work
    // ---------------------------------------------------------------------

    /// Checks every node and provider. Errors and timeouts count as failures.
    pub async fn run_health_checks(&self) -> HealthSummary {
        let timeout = self.node_timeout();
        let checks = self.registry.all(None).into_iter().map(|node| async move {
            let result = with_timeout(timeout, node.backend().health_check()).await;
            (node, result)
        });

        let mut nodes = Vec::new();
        for (node, result) in join_all(checks).await {
            let healthy = result.is_ok();
            if let Err(e) = &result {
                warn!(node = %node.location(), error = %e, "Node health check failed");
                self.events.emit(
                    CacheEventKind::HealthCheckError,
                    json!({ "node": node.location(), "error": e.to_string() }),
                );
            }
            self.registry.record_health(node.location(), healthy);
            nodes.push(NodeHealthReport {
                node: node.location().to_string(),
                healthy,
                status: node.status(),
            });
        }

        let providers = self.gateway.run_health_checks().await;
        HealthSummary { nodes, providers }
    }

    /// Retrains the predictive model from the access log.
    pub async fn train_model(&self) -> TrainingOutcome {
        let outcome = match self.access_log.patterns().await {
            Ok(patterns) => self.engine.train(&patterns),
            Err(e) => {
                warn!(error = %e, "Failed to read access patterns");
                TrainingOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if let TrainingOutcome::Failed { reason } = &outcome {
            self.events
                .emit(CacheEventKind::TrainingError, json!({ "error": reason }));
        }
        outcome
    }

    /// Warms the pending predictions that clear the warmup confidence threshold.
    pub async fn dispatch_warmup(&self) -> WarmupOutcome {
        let threshold = self.config.orchestrator.warmup_confidence_threshold;
        let batch: Vec<_> = self
            .engine
            .take_pending()
            .into_iter()
            .filter(|p| p.confidence >= threshold)
            .collect();
        self.warmup_cache(batch).await
    }

    pub async fn roll_up_provider_metrics(&self) -> HashMap<String, ProviderAnalytics> {
        self.gateway
            .collect_metrics(self.config.schedule.provider_metrics_interval)
            .await
    }
}
