//! CDN provider integration for edgeweave.
//!
//! - Vendor capability trait and request/response types
//! - Gateway with failover, config sync and invalidation mirroring
//! - Cache and invalidation rule engine
//! - In-process provider for development and tests

pub mod gateway;
pub mod memory;
pub mod rules;

pub use gateway::{
    BatchUpload, FailoverEntry, GatewayConfig, HealthCheckReport, InvalidationReport,
    ProviderGateway, ProviderState, ProviderStatus, SwitchRecord,
};
pub use memory::MemoryProvider;
pub use rules::{AppliedCacheRules, CacheRule, InvalidationPlan, InvalidationRule, RuleSet};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Asset upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub path: String,
    pub content: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub custom_headers: HashMap<String, String>,
    pub region: Option<String>,
}

impl UploadRequest {
    pub fn new(path: impl Into<String>, content: Bytes) -> Self {
        Self {
            path: path.into(),
            content,
            ..Self::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub etag: String,
}

/// Purge request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurgeRequest {
    pub paths: Vec<String>,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub purge_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Analytics query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRequest {
    pub date_range: Option<DateRange>,
    /// Metric names; empty means all.
    pub metrics: Vec<String>,
}

/// Vendor analytics, metric name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAnalytics {
    pub metrics: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub response_time_ms: f64,
}

/// One CDN vendor.
///
/// Adapters are supplied by the host application and held by name in the gateway.
#[async_trait]
pub trait CdnProvider: Send + Sync {
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    async fn upload(&self, request: UploadRequest) -> Result<UploadResponse>;

    async fn invalidate(&self, request: PurgeRequest) -> Result<PurgeResponse>;

    async fn get_config(&self) -> Result<serde_json::Value>;

    async fn update_config(&self, config: serde_json::Value) -> Result<()>;

    async fn get_analytics(&self, request: AnalyticsRequest) -> Result<ProviderAnalytics>;

    async fn health_check(&self) -> Result<ProviderHealth>;
}
