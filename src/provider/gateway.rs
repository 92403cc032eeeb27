//! Multi-provider gateway.
//!
//! Holds every registered CDN adapter by name with exactly one active provider for
//! uploads. Health checks drive a per-provider state machine:
//!
//! ```text
//!   Active ⇄ Degraded ──(threshold failures)──▶ FailoverQueued ──switch──▶ Standby
//!     ▲                                                                      │
//!     └───────────────────────────── switch to ◀─────────────────────────────┘
//! ```
//!
//! Promotion is never automatic: a queued provider stays active until
//! [`ProviderGateway::switch_provider`] is called.

use super::rules::{AppliedCacheRules, CacheRule, InvalidationPlan, InvalidationRule, RuleSet};
use super::{
    AnalyticsRequest, CdnProvider, DateRange, ProviderAnalytics, ProviderHealth, PurgeRequest,
    UploadRequest, UploadResponse,
};
use crate::config::EdgeweaveConfig;
use crate::error::{EdgeError, Result};
use crate::events::{CacheEventKind, EventBus};
use crate::observability;
use crate::resilience::{with_timeout, HealthLevel, HealthThresholds, HealthTracker};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reason recorded when health checks queue a provider.
pub const HEALTH_CHECK_FAILED: &str = "health_check_failed";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Mirror invalidations and sync config on switch.
    pub enable_real_time_sync: bool,
    /// Consecutive failed checks before a provider is queued for failover.
    pub failover_threshold: u32,
    /// Consecutive successful checks before a degraded provider is active again.
    pub recover_after: u32,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Bulk upload concurrency limit.
    pub upload_concurrency: usize,
}

impl GatewayConfig {
    pub fn from_config(config: &EdgeweaveConfig) -> Self {
        Self {
            enable_real_time_sync: config.providers.enable_real_time_sync,
            failover_threshold: config.health.provider_failover_threshold,
            recover_after: config.health.recover_after,
            timeout: config.orchestrator.provider_timeout,
            upload_concurrency: config.orchestrator.upload_concurrency,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_config(&EdgeweaveConfig::default())
    }
}

/// Provider lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    /// Healthy and in service.
    Active,
    /// Failing health checks, below the failover threshold.
    Degraded,
    /// Awaiting an explicit switch.
    FailoverQueued,
    /// Retired by a switch; still receives mirrored invalidations.
    Standby,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverEntry {
    pub provider: String,
    pub reason: String,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub from: Option<String>,
    pub to: String,
    pub reason: String,
    /// False when sync was disabled or failed.
    pub config_synced: bool,
    pub switched_at: DateTime<Utc>,
}

/// Per-provider status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub base_url: String,
    pub state: ProviderState,
    pub active: bool,
    pub consecutive_failures: u32,
    pub last_health: Option<ProviderHealth>,
    pub last_checked: Option<DateTime<Utc>>,
    pub analytics: Option<ProviderAnalytics>,
}

/// Result of an invalidation through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub provider: String,
    pub purge_id: String,
    /// Providers the purge was mirrored to.
    pub synced: Vec<String>,
    /// Provider name and error for failed mirrors.
    pub sync_failures: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpload {
    pub path: String,
    pub response: Option<UploadResponse>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckReport {
    pub provider: String,
    pub healthy: bool,
    pub response_time_ms: f64,
    pub state: ProviderState,
    /// Set when this check queued the provider.
    pub queued: bool,
}

struct ProviderSlot {
    adapter: Arc<dyn CdnProvider>,
    health: HealthTracker,
    queued: bool,
    standby: bool,
    last_health: Option<ProviderHealth>,
    last_checked: Option<DateTime<Utc>>,
    analytics: Option<ProviderAnalytics>,
}

impl ProviderSlot {
    fn state(&self) -> ProviderState {
        if self.standby {
            ProviderState::Standby
        } else if self.queued {
            ProviderState::FailoverQueued
        } else {
            match self.health.level() {
                HealthLevel::Healthy => ProviderState::Active,
                HealthLevel::Degraded | HealthLevel::Down => ProviderState::Degraded,
            }
        }
    }
}

#[derive(Default)]
struct GatewayInner {
    slots: HashMap<String, ProviderSlot>,
    order: Vec<String>,
    active: Option<String>,
    queue: Vec<FailoverEntry>,
    history: Vec<SwitchRecord>,
}

/// CDN provider gateway.
pub struct ProviderGateway {
    config: GatewayConfig,
    inner: RwLock<GatewayInner>,
    cache_rules: RwLock<RuleSet<CacheRule>>,
    invalidation_rules: RwLock<RuleSet<InvalidationRule>>,
    events: Arc<EventBus>,
}

impl ProviderGateway {
    pub fn new(config: GatewayConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            inner: RwLock::new(GatewayInner::default()),
            cache_rules: RwLock::new(RuleSet::default()),
            invalidation_rules: RwLock::new(RuleSet::default()),
            events,
        }
    }

    fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            down_after: self.config.failover_threshold,
            recover_after: self.config.recover_after,
        }
    }

    /// Registers an adapter. Re-registering a name replaces the adapter.
    pub fn register(&self, adapter: Arc<dyn CdnProvider>) {
        let name = adapter.name().to_string();
        let slot = ProviderSlot {
            adapter,
            health: HealthTracker::new(self.thresholds()),
            queued: false,
            standby: false,
            last_health: None,
            last_checked: None,
            analytics: None,
        };

        let mut inner = self.inner.write();
        if inner.slots.insert(name.clone(), slot).is_some() {
            warn!(provider = %name, "Replacing registered provider");
        } else {
            inner.order.push(name.clone());
            info!(provider = %name, "Registered CDN provider");
        }
    }

    /// Sets the initial active provider without config sync.
    pub fn set_active(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.slots.contains_key(name) {
            return Err(EdgeError::ProviderNotFound(name.to_string()));
        }
        inner.active = Some(name.to_string());
        info!(provider = %name, "Active provider set");
        Ok(())
    }

    pub fn active(&self) -> Option<String> {
        self.inner.read().active.clone()
    }

    pub fn has_active(&self) -> bool {
        self.inner.read().active.is_some()
    }

    pub fn providers(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    fn active_adapter(&self) -> Result<(String, Arc<dyn CdnProvider>)> {
        let inner = self.inner.read();
        let name = inner.active.clone().ok_or(EdgeError::NoActiveProvider)?;
        let slot = inner
            .slots
            .get(&name)
            .ok_or_else(|| EdgeError::ProviderNotFound(name.clone()))?;
        Ok((name, slot.adapter.clone()))
    }

    fn adapters_except(&self, skip: &str) -> Vec<(String, Arc<dyn CdnProvider>)> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|name| name.as_str() != skip)
            .filter_map(|name| inner.slots.get(name).map(|s| (name.clone(), s.adapter.clone())))
            .collect()
    }

    fn all_adapters(&self) -> Vec<(String, Arc<dyn CdnProvider>)> {
        self.adapters_except("")
    }

    // ---------------------------------------------------------------------
    // Rules
    // ---------------------------------------------------------------------

    pub fn add_cache_rule(&self, pattern: &str, rule: CacheRule) -> Result<()> {
        let replaced = self.cache_rules.write().insert(pattern, rule.clone())?;
        info!(pattern = %pattern, replaced, "Cache rule added");
        self.events.emit(
            CacheEventKind::CacheRuleAdded,
            json!({ "pattern": pattern, "kind": "cache", "rule": rule, "replaced": replaced }),
        );
        Ok(())
    }

    pub fn add_invalidation_rule(&self, pattern: &str, rule: InvalidationRule) -> Result<()> {
        let replaced = self.invalidation_rules.write().insert(pattern, rule.clone())?;
        info!(pattern = %pattern, replaced, "Invalidation rule added");
        self.events.emit(
            CacheEventKind::CacheRuleAdded,
            json!({ "pattern": pattern, "kind": "invalidation", "rule": rule, "replaced": replaced }),
        );
        Ok(())
    }

    /// Effective cache settings for a path.
    pub fn cache_rules_for(&self, path: &str) -> AppliedCacheRules {
        self.cache_rules.read().apply(path)
    }

    /// Expands an invalidation through the invalidation rules.
    pub fn plan_invalidation(&self, paths: &[String], recursive: bool) -> InvalidationPlan {
        let plan = self.invalidation_rules.read().expand(paths, recursive);
        for pattern in &plan.triggered {
            debug!(pattern = %pattern, "Invalidation rule triggered");
            self.events.emit(
                CacheEventKind::InvalidationRuleTriggered,
                json!({ "pattern": pattern, "paths": plan.paths }),
            );
        }
        plan
    }

    pub fn rule_patterns(&self) -> (Vec<String>, Vec<String>) {
        (
            self.cache_rules.read().patterns(),
            self.invalidation_rules.read().patterns(),
        )
    }

    // ---------------------------------------------------------------------
    // Content operations
    // ---------------------------------------------------------------------

    /// Uploads through the active provider after applying every matching cache rule.
    pub async fn upload(&self, mut request: UploadRequest) -> Result<UploadResponse> {
        let (name, adapter) = self.active_adapter()?;

        let applied = self.cache_rules_for(&request.path);
        if let Some(cc) = applied.cache_control {
            request.cache_control = Some(cc);
        }
        request.custom_headers.extend(applied.headers);

        let path = request.path.clone();
        let response = with_timeout(self.config.timeout, adapter.upload(request))
            .await
            .map_err(|e| EdgeError::provider(&name, e.to_string()))?;

        debug!(provider = %name, path = %path, url = %response.url, "Uploaded asset");
        Ok(response)
    }

    /// Uploads many assets with bounded concurrency. Per-asset failures are reported inline.
    pub async fn upload_batch(&self, requests: Vec<UploadRequest>) -> Result<Vec<BatchUpload>> {
        self.active_adapter()?;
        let limit = self.config.upload_concurrency.max(1);

        let results = stream::iter(requests)
            .map(|request| async move {
                let path = request.path.clone();
                match self.upload(request).await {
                    Ok(response) => BatchUpload {
                        path,
                        response: Some(response),
                        error: None,
                    },
                    Err(e) => {
                        warn!(path = %path, error = %e, "Batch upload failed");
                        BatchUpload {
                            path,
                            response: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await;

        Ok(results)
    }

    /// Purges on the active provider, then mirrors to every other provider when sync is on.
    pub async fn invalidate(&self, paths: &[String], recursive: bool) -> Result<InvalidationReport> {
        let (name, adapter) = self.active_adapter()?;
        let request = PurgeRequest {
            paths: paths.to_vec(),
            recursive,
        };

        let purge = with_timeout(self.config.timeout, adapter.invalidate(request.clone()))
            .await
            .map_err(|e| EdgeError::provider(&name, e.to_string()))?;

        let mut report = InvalidationReport {
            provider: name.clone(),
            purge_id: purge.purge_id,
            synced: Vec::new(),
            sync_failures: Vec::new(),
        };

        if !self.config.enable_real_time_sync {
            return Ok(report);
        }

        let others = self.adapters_except(&name);
        let timeout = self.config.timeout;
        let mirrors = others.into_iter().map(|(other, adapter)| {
            let request = request.clone();
            async move {
                let result = with_timeout(timeout, adapter.invalidate(request)).await;
                (other, result)
            }
        });

        for (other, result) in join_all(mirrors).await {
            match result {
                Ok(_) => report.synced.push(other),
                Err(e) => {
                    warn!(from = %name, to = %other, error = %e, "Invalidation sync failed");
                    self.events.emit(
                        CacheEventKind::SyncError,
                        json!({ "from": name, "to": other, "paths": paths, "error": e.to_string() }),
                    );
                    report.sync_failures.push((other, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    // ---------------------------------------------------------------------
    // Health and failover
    // ---------------------------------------------------------------------

    /// Checks every provider. Errors and timeouts count as failed checks.
    pub async fn run_health_checks(&self) -> Vec<HealthCheckReport> {
        let timeout = self.config.timeout;
        let checks = self.all_adapters().into_iter().map(|(name, adapter)| async move {
            let started = Instant::now();
            let result = with_timeout(timeout, adapter.health_check()).await;
            (name, result, started.elapsed())
        });
        let results = join_all(checks).await;

        let mut reports = Vec::with_capacity(results.len());
        for (name, result, elapsed) in results {
            let health = match result {
                Ok(health) => health,
                Err(e) => {
                    debug!(provider = %name, error = %e, "Provider health check errored");
                    ProviderHealth {
                        healthy: false,
                        response_time_ms: elapsed.as_secs_f64() * 1000.0,
                    }
                }
            };
            if let Some(report) = self.apply_health(&name, health) {
                reports.push(report);
            }
        }

        reports
    }

    fn apply_health(&self, name: &str, health: ProviderHealth) -> Option<HealthCheckReport> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(name)?;

        slot.last_health = Some(health);
        slot.last_checked = Some(Utc::now());
        let transition = slot.health.record(health.healthy);

        let mut queued = false;
        if transition == Some(HealthLevel::Down) && !slot.queued && !slot.standby {
            slot.queued = true;
            queued = true;
        }
        let state = slot.state();
        let failures = slot.health.consecutive_failures();

        if queued {
            let already = inner.queue.iter().any(|e| e.provider == name);
            if !already {
                inner.queue.push(FailoverEntry {
                    provider: name.to_string(),
                    reason: HEALTH_CHECK_FAILED.to_string(),
                    queued_at: Utc::now(),
                });
            }
            warn!(provider = %name, failures, "Provider queued for failover");
        } else if transition == Some(HealthLevel::Healthy) {
            info!(provider = %name, "Provider recovered");
        }

        drop(inner);

        if !health.healthy {
            warn!(provider = %name, failures, "Provider health check failed");
            self.events.emit(
                CacheEventKind::HealthCheckError,
                json!({ "provider": name, "consecutive_failures": failures, "state": state }),
            );
        }

        Some(HealthCheckReport {
            provider: name.to_string(),
            healthy: health.healthy,
            response_time_ms: health.response_time_ms,
            state,
            queued,
        })
    }

    pub fn failover_queue(&self) -> Vec<FailoverEntry> {
        self.inner.read().queue.clone()
    }

    pub fn switch_history(&self) -> Vec<SwitchRecord> {
        self.inner.read().history.clone()
    }

    /// Makes `name` the active provider.
    ///
    /// With sync enabled the previous provider's config is pushed to the new one
    /// first; a sync failure is logged and the switch still happens.
    pub async fn switch_provider(&self, name: &str, reason: &str) -> Result<SwitchRecord> {
        let (previous, target) = {
            let inner = self.inner.read();
            let Some(target) = inner.slots.get(name).map(|s| s.adapter.clone()) else {
                drop(inner);
                warn!(provider = %name, "Switch to unknown provider");
                self.events.emit(
                    CacheEventKind::ProviderSwitchError,
                    json!({ "to": name, "reason": reason, "error": "provider not found" }),
                );
                return Err(EdgeError::ProviderNotFound(name.to_string()));
            };
            let previous = inner
                .active
                .as_ref()
                .and_then(|p| inner.slots.get(p).map(|s| (p.clone(), s.adapter.clone())));
            (previous, target)
        };

        if previous.as_ref().map(|(p, _)| p.as_str()) == Some(name) {
            info!(provider = %name, "Provider already active");
            return Ok(SwitchRecord {
                from: Some(name.to_string()),
                to: name.to_string(),
                reason: reason.to_string(),
                config_synced: false,
                switched_at: Utc::now(),
            });
        }

        let mut config_synced = false;
        if self.config.enable_real_time_sync {
            if let Some((from, source)) = &previous {
                match self.sync_config(from, source.as_ref(), name, target.as_ref()).await {
                    Ok(()) => config_synced = true,
                    Err(e) => {
                        warn!(from = %from, to = %name, error = %e, "Config sync failed, switching anyway");
                        self.events.emit(
                            CacheEventKind::SyncError,
                            json!({ "from": from, "to": name, "error": e.to_string() }),
                        );
                    }
                }
            }
        }

        let record = {
            let mut inner = self.inner.write();
            let from = inner.active.replace(name.to_string());

            if let Some(old) = from.as_ref().and_then(|f| inner.slots.get_mut(f)) {
                old.standby = true;
                old.queued = false;
            }
            if let Some(new) = inner.slots.get_mut(name) {
                new.standby = false;
                new.queued = false;
                new.health = HealthTracker::new(self.thresholds());
            }
            inner
                .queue
                .retain(|e| Some(&e.provider) != from.as_ref() && e.provider != name);

            let record = SwitchRecord {
                from,
                to: name.to_string(),
                reason: reason.to_string(),
                config_synced,
                switched_at: Utc::now(),
            };
            inner.history.push(record.clone());
            record
        };

        let from = record.from.clone().unwrap_or_default();
        info!(from = %from, to = %name, reason = %reason, config_synced, "Switched CDN provider");
        observability::record_provider_switch(&from, name);
        self.events.emit(CacheEventKind::ProviderSwitched, json!(record));

        Ok(record)
    }

    async fn sync_config(
        &self,
        from: &str,
        source: &dyn CdnProvider,
        to: &str,
        target: &dyn CdnProvider,
    ) -> Result<()> {
        let sync_error = |e: EdgeError| EdgeError::ConfigSync {
            from: from.to_string(),
            to: to.to_string(),
            reason: e.to_string(),
        };

        let config = with_timeout(self.config.timeout, source.get_config())
            .await
            .map_err(sync_error)?;
        with_timeout(self.config.timeout, target.update_config(config))
            .await
            .map_err(sync_error)?;

        debug!(from = %from, to = %to, "Synced provider config");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Analytics
    // ---------------------------------------------------------------------

    /// Pulls analytics for the last period from every provider and keeps the latest.
    pub async fn collect_metrics(&self, period: Duration) -> HashMap<String, ProviderAnalytics> {
        let end = Utc::now();
        let start = end - chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::hours(1));
        let request = AnalyticsRequest {
            date_range: Some(DateRange { start, end }),
            metrics: Vec::new(),
        };

        let timeout = self.config.timeout;
        let calls = self.all_adapters().into_iter().map(|(name, adapter)| {
            let request = request.clone();
            async move { (name, with_timeout(timeout, adapter.get_analytics(request)).await) }
        });

        let mut collected = HashMap::new();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(analytics) => {
                    if let Some(slot) = self.inner.write().slots.get_mut(&name) {
                        slot.analytics = Some(analytics.clone());
                    }
                    collected.insert(name, analytics);
                }
                Err(e) => warn!(provider = %name, error = %e, "Provider analytics collection failed"),
            }
        }

        debug!(providers = collected.len(), "Collected provider metrics");
        collected
    }

    pub fn statuses(&self) -> Vec<ProviderStatus> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| {
                inner.slots.get(name).map(|slot| ProviderStatus {
                    name: name.clone(),
                    base_url: slot.adapter.base_url().to_string(),
                    state: slot.state(),
                    active: inner.active.as_deref() == Some(name.as_str()),
                    consecutive_failures: slot.health.consecutive_failures(),
                    last_health: slot.last_health,
                    last_checked: slot.last_checked,
                    analytics: slot.analytics.clone(),
                })
            })
            .collect()
    }

    pub fn state_of(&self, name: &str) -> Option<ProviderState> {
        self.inner.read().slots.get(name).map(|s| s.state())
    }
}
