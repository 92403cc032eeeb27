// In-process CDN provider

use super::{
    AnalyticsRequest, CdnProvider, ProviderAnalytics, ProviderHealth, PurgeRequest, PurgeResponse,
    UploadRequest, UploadResponse,
};
use crate::error::{EdgeError, Result};
use crate::pattern::is_beneath;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Stored asset.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub etag: String,
    pub size: u64,
    pub cache_control: Option<String>,
    pub headers: HashMap<String, String>,
}

/// CDN provider that keeps assets in memory, with fault toggles for tests.
pub struct MemoryProvider {
    name: String,
    base_url: String,
    healthy: AtomicBool,
    fail_uploads: AtomicBool,
    fail_purges: AtomicBool,
    fail_config: AtomicBool,
    config: Mutex<serde_json::Value>,
    assets: Mutex<HashMap<String, StoredAsset>>,
    purges: Mutex<Vec<PurgeRequest>>,
    uploads: AtomicU64,
    upload_delay_ms: AtomicU64,
    uploads_in_flight: AtomicU64,
    peak_uploads_in_flight: AtomicU64,
    config_reads: AtomicU64,
    health_checks: AtomicU64,
    bytes_uploaded: AtomicU64,
}

impl MemoryProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            config: Mutex::new(json!({ "provider": name.clone() })),
            name,
            base_url: base_url.into(),
            healthy: AtomicBool::new(true),
            fail_uploads: AtomicBool::new(false),
            fail_purges: AtomicBool::new(false),
            fail_config: AtomicBool::new(false),
            assets: Mutex::new(HashMap::new()),
            purges: Mutex::new(Vec::new()),
            uploads: AtomicU64::new(0),
            upload_delay_ms: AtomicU64::new(0),
            uploads_in_flight: AtomicU64::new(0),
            peak_uploads_in_flight: AtomicU64::new(0),
            config_reads: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_purges(&self, fail: bool) {
        self.fail_purges.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_config(&self, fail: bool) {
        self.fail_config.store(fail, Ordering::SeqCst);
    }

    /// Holds every upload open for `delay` before it completes.
    pub fn set_upload_delay(&self, delay: Duration) {
        self.upload_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn asset(&self, path: &str) -> Option<StoredAsset> {
        self.assets.lock().get(path).cloned()
    }

    pub fn purges(&self) -> Vec<PurgeRequest> {
        self.purges.lock().clone()
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Most uploads ever running at the same time.
    pub fn peak_uploads_in_flight(&self) -> u64 {
        self.peak_uploads_in_flight.load(Ordering::SeqCst)
    }

    /// Successful and failed `get_config` calls.
    pub fn config_reads(&self) -> u64 {
        self.config_reads.load(Ordering::SeqCst)
    }

    pub fn health_check_count(&self) -> u64 {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> serde_json::Value {
        self.config.lock().clone()
    }

    fn fail(&self, flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(EdgeError::provider(&self.name, format!("{} failed", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CdnProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn upload(&self, request: UploadRequest) -> Result<UploadResponse> {
        self.fail(&self.fail_uploads, "upload")?;

        let running = self.uploads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_uploads_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = self.upload_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.uploads_in_flight.fetch_sub(1, Ordering::SeqCst);

        let etag = format!("\"{}\"", Uuid::new_v4().simple());
        let size = request.content.len() as u64;
        self.assets.lock().insert(
            request.path.clone(),
            StoredAsset {
                etag: etag.clone(),
                size,
                cache_control: request.cache_control,
                headers: request.custom_headers,
            },
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.bytes_uploaded.fetch_add(size, Ordering::Relaxed);

        Ok(UploadResponse {
            url: format!("{}{}", self.base_url.trim_end_matches('/'), request.path),
            etag,
        })
    }

    async fn invalidate(&self, request: PurgeRequest) -> Result<PurgeResponse> {
        self.fail(&self.fail_purges, "purge")?;

        {
            let mut assets = self.assets.lock();
            for path in &request.paths {
                if request.recursive {
                    assets.retain(|k, _| !is_beneath(k, path));
                } else {
                    assets.remove(path);
                }
            }
        }
        self.purges.lock().push(request);

        Ok(PurgeResponse {
            purge_id: Uuid::new_v4().to_string(),
        })
    }

    async fn get_config(&self) -> Result<serde_json::Value> {
        self.config_reads.fetch_add(1, Ordering::SeqCst);
        self.fail(&self.fail_config, "get_config")?;
        Ok(self.config.lock().clone())
    }

    async fn update_config(&self, config: serde_json::Value) -> Result<()> {
        self.fail(&self.fail_config, "update_config")?;
        *self.config.lock() = config;
        Ok(())
    }

    async fn get_analytics(&self, request: AnalyticsRequest) -> Result<ProviderAnalytics> {
        let mut metrics = HashMap::new();
        metrics.insert("uploads".to_string(), self.uploads.load(Ordering::Relaxed) as f64);
        metrics.insert(
            "bytes_uploaded".to_string(),
            self.bytes_uploaded.load(Ordering::Relaxed) as f64,
        );
        metrics.insert("purges".to_string(), self.purges.lock().len() as f64);
        metrics.insert("objects".to_string(), self.assets.lock().len() as f64);

        if !request.metrics.is_empty() {
            metrics.retain(|k, _| request.metrics.contains(k));
        }
        Ok(ProviderAnalytics { metrics })
    }

    async fn health_check(&self) -> Result<ProviderHealth> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderHealth {
            healthy: self.healthy.load(Ordering::SeqCst),
            response_time_ms: 1.0,
        })
    }
}
