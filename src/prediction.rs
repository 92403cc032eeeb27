//! Predictive warmup model.
//!
//! Learns which content is hot from access-pattern samples and emits ranked,
//! confidence-scored predictions that drive cache warmup.
//!
//! # How It Works
//!
//! ```text
//! ┌──────────────┐   patterns   ┌──────────────────┐  predictions  ┌──────────────┐
//! │  Access Log  │ ───────────▶ │ PredictiveEngine │ ────────────▶ │ Warmup cycle │
//! └──────────────┘  (every 5m)  │  └─ model        │   (every 1m)  └──────────────┘
//!        ▲                      └──────────────────┘        │
//!        │ get_content                    │ current set     ▼
//!   Orchestrator ◀──────── predictive strategy ◀─────── cache_content
//! ```
//!
//! The engine keeps two views of the latest model output: the *current* set read by
//! the predictive strategy, and a *pending* batch consumed once by the warmup dispatch.

use crate::edge::NodeRegistry;
use crate::error::{EdgeError, Result};
use crate::resilience::with_timeout;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One access-pattern sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPattern {
    pub path: String,
    pub access_count: u64,
    pub access_timestamp: DateTime<Utc>,
    pub user_location: String,
}

/// A predicted hot path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub path: String,
    pub ttl_secs: u64,
    /// Confidence score (0-1).
    pub confidence: f64,
    /// Where to fetch the content from; the content source decides when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Prediction {
    pub fn new(path: impl Into<String>, ttl_secs: u64, confidence: f64) -> Self {
        Self {
            path: path.into(),
            ttl_secs,
            confidence: confidence.clamp(0.0, 1.0),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Trainable prediction model.
pub trait PredictionModel: Send + Sync {
    /// Rebuilds the model from access samples.
    fn train(&mut self, patterns: &[AccessPattern]) -> Result<()>;

    /// Ranked predictions, highest confidence first.
    fn generate_predictions(&self) -> Vec<Prediction>;
}

/// Recency model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecencyModelConfig {
    /// Age at which a sample counts half.
    pub half_life: Duration,
    /// Maximum predictions emitted.
    pub top_k: usize,
    /// TTL given to a prediction of confidence 1.0.
    pub base_ttl_secs: u64,
    /// Predictions below this confidence are dropped.
    pub min_confidence: f64,
}

impl Default for RecencyModelConfig {
    fn default() -> Self {
        Self {
            half_life: Duration::from_secs(3600),
            top_k: 50,
            base_ttl_secs: 3600,
            min_confidence: 0.05,
        }
    }
}

/// Exponentially decayed access-frequency model.
///
/// Each sample contributes `access_count * 0.5^(age / half_life)` to its path; confidence
/// is the path score relative to the hottest path, so more recent traffic always ranks higher.
#[derive(Debug, Clone)]
pub struct RecencyModel {
    config: RecencyModelConfig,
    scores: HashMap<String, f64>,
}

impl RecencyModel {
    pub fn new(config: RecencyModelConfig) -> Self {
        Self {
            config,
            scores: HashMap::new(),
        }
    }

    fn weight(&self, age: Duration) -> f64 {
        let half_life = self.config.half_life.as_secs_f64().max(1.0);
        0.5f64.powf(age.as_secs_f64() / half_life)
    }
}

impl Default for RecencyModel {
    fn default() -> Self {
        Self::new(RecencyModelConfig::default())
    }
}

impl PredictionModel for RecencyModel {
    fn train(&mut self, patterns: &[AccessPattern]) -> Result<()> {
        if patterns.is_empty() {
            return Err(EdgeError::ModelTraining("no access patterns".to_string()));
        }

        let now = Utc::now();
        let mut scores: HashMap<String, f64> = HashMap::new();

        for pattern in patterns {
            if pattern.path.is_empty() {
                continue;
            }
            let age = (now - pattern.access_timestamp).to_std().unwrap_or(Duration::ZERO);
            *scores.entry(pattern.path.clone()).or_insert(0.0) +=
                pattern.access_count as f64 * self.weight(age);
        }

        if scores.is_empty() {
            return Err(EdgeError::ModelTraining("no usable access patterns".to_string()));
        }

        self.scores = scores;
        Ok(())
    }

    fn generate_predictions(&self) -> Vec<Prediction> {
        let max = self.scores.values().cloned().fold(0.0, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let mut predictions: Vec<_> = self
            .scores
            .iter()
            .map(|(path, score)| (path, score / max))
            .filter(|(_, confidence)| *confidence >= self.config.min_confidence)
            .map(|(path, confidence)| {
                let ttl = (self.config.base_ttl_secs as f64 * (0.5 + confidence / 2.0)).round();
                Prediction::new(path.clone(), (ttl as u64).max(1), confidence)
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        predictions.truncate(self.config.top_k);
        predictions
    }
}

/// Result of one training cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    Trained { predictions: usize },
    Failed { reason: String },
}

/// Training statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStats {
    pub trainings: u64,
    pub failures: u64,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub current_predictions: usize,
}

/// Owns a prediction model and publishes its output.
pub struct PredictiveEngine {
    model: Mutex<Box<dyn PredictionModel>>,
    current: RwLock<Arc<Vec<Prediction>>>,
    pending: Mutex<Vec<Prediction>>,
    stats: Mutex<ModelStats>,
}

impl PredictiveEngine {
    pub fn new(model: Box<dyn PredictionModel>) -> Self {
        Self {
            model: Mutex::new(model),
            current: RwLock::new(Arc::new(Vec::new())),
            pending: Mutex::new(Vec::new()),
            stats: Mutex::new(ModelStats::default()),
        }
    }

    /// Trains the model. Failures are logged and counted; the previous predictions stay.
    pub fn train(&self, patterns: &[AccessPattern]) -> TrainingOutcome {
        let result = {
            let mut model = self.model.lock();
            model.train(patterns).map(|_| model.generate_predictions())
        };

        match result {
            Ok(predictions) => {
                let count = predictions.len();
                self.publish(predictions);

                let mut stats = self.stats.lock();
                stats.trainings += 1;
                stats.last_trained_at = Some(Utc::now());
                stats.last_error = None;

                info!(samples = patterns.len(), predictions = count, "Predictive model trained");
                TrainingOutcome::Trained { predictions: count }
            }
            Err(e) => {
                let mut stats = self.stats.lock();
                stats.failures += 1;
                stats.last_error = Some(e.to_string());

                warn!(error = %e, "Predictive model training failed");
                TrainingOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Replaces the current prediction set and the pending warmup batch.
    pub fn publish(&self, predictions: Vec<Prediction>) {
        self.stats.lock().current_predictions = predictions.len();
        *self.pending.lock() = predictions.clone();
        *self.current.write() = Arc::new(predictions);
    }

    /// Latest prediction set.
    pub fn current(&self) -> Arc<Vec<Prediction>> {
        self.current.read().clone()
    }

    /// Takes the pending batch; later calls return nothing until the next training.
    pub fn take_pending(&self) -> Vec<Prediction> {
        let batch = std::mem::take(&mut *self.pending.lock());
        debug!(count = batch.len(), "Took pending predictions");
        batch
    }

    pub fn stats(&self) -> ModelStats {
        self.stats.lock().clone()
    }
}

impl Default for PredictiveEngine {
    fn default() -> Self {
        Self::new(Box::new(RecencyModel::default()))
    }
}

/// Source of access-pattern history.
#[async_trait]
pub trait AccessLog: Send + Sync {
    /// Records one access.
    async fn record(&self, path: &str, user_location: &str);

    /// Aggregated samples for training.
    async fn patterns(&self) -> Result<Vec<AccessPattern>>;
}

/// Bounded in-memory access log keyed by (path, location).
pub struct MemoryAccessLog {
    capacity: usize,
    entries: Mutex<HashMap<(String, String), AccessPattern>>,
}

impl MemoryAccessLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccessLog for MemoryAccessLog {
    async fn record(&self, path: &str, user_location: &str) {
        let now = Utc::now();
        let key = (path.to_string(), user_location.to_string());
        let mut entries = self.entries.lock();

        if let Some(pattern) = entries.get_mut(&key) {
            pattern.access_count += 1;
            pattern.access_timestamp = now;
            return;
        }

        if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, p)| p.access_timestamp)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            AccessPattern {
                path: path.to_string(),
                access_count: 1,
                access_timestamp: now,
                user_location: user_location.to_string(),
            },
        );
    }

    async fn patterns(&self) -> Result<Vec<AccessPattern>> {
        Ok(self.entries.lock().values().cloned().collect())
    }
}

/// Where warmup fetches predicted content from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, prediction: &Prediction) -> Result<Bytes>;
}

/// Reads predicted content from a registered node: the prediction's declared
/// source location, or the origin.
pub struct NodeContentSource {
    registry: Arc<NodeRegistry>,
    timeout: Duration,
}

impl NodeContentSource {
    pub fn new(registry: Arc<NodeRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }
}

#[async_trait]
impl ContentSource for NodeContentSource {
    async fn fetch(&self, prediction: &Prediction) -> Result<Bytes> {
        let node = match &prediction.source {
            Some(location) => self.registry.get(location),
            None => self.registry.origin(),
        };
        let source_error = |reason: String| EdgeError::ContentSource {
            path: prediction.path.clone(),
            reason,
        };

        let node = node.ok_or_else(|| source_error("source node not registered".to_string()))?;
        with_timeout(self.timeout, node.backend().fetch(&prediction.path))
            .await
            .map_err(|e| source_error(e.to_string()))?
            .ok_or_else(|| source_error(format!("not found on {}", node.location())))
    }
}
