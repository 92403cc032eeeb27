//! Configuration module for edgeweave.

use crate::edge::NodeTier;
use crate::error::{EdgeError, Result};
use crate::strategy::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for an edgeweave orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeweaveConfig {
    /// Orchestrator behaviour.
    pub orchestrator: OrchestratorConfig,
    /// Strategy tuning.
    pub strategy: StrategyConfig,
    /// Health state machine thresholds.
    pub health: HealthConfig,
    /// Background timer cadence.
    pub schedule: ScheduleConfig,
    /// CDN provider settings.
    pub providers: ProvidersConfig,
    /// Static node topology.
    pub topology: TopologyConfig,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl EdgeweaveConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EdgeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| EdgeError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.default_ttl_secs == 0 {
            return Err(EdgeError::InvalidConfig {
                field: "orchestrator.default_ttl_secs".to_string(),
                reason: "TTL must be positive".to_string(),
            });
        }

        if self.orchestrator.upload_concurrency == 0 {
            return Err(EdgeError::InvalidConfig {
                field: "orchestrator.upload_concurrency".to_string(),
                reason: "Concurrency limit must be non-zero".to_string(),
            });
        }

        for (field, value) in [
            (
                "strategy.predictive_confidence_threshold",
                self.strategy.predictive_confidence_threshold,
            ),
            (
                "orchestrator.warmup_confidence_threshold",
                self.orchestrator.warmup_confidence_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EdgeError::InvalidConfig {
                    field: field.to_string(),
                    reason: "Confidence threshold must be within [0, 1]".to_string(),
                });
            }
        }

        for (field, value) in [
            ("health.node_fail_after", self.health.node_fail_after),
            ("health.recover_after", self.health.recover_after),
            (
                "health.provider_failover_threshold",
                self.health.provider_failover_threshold,
            ),
        ] {
            if value == 0 {
                return Err(EdgeError::InvalidConfig {
                    field: field.to_string(),
                    reason: "Health thresholds must be non-zero".to_string(),
                });
            }
        }

        if !self.topology.nodes.is_empty()
            && !self.topology.nodes.iter().any(|n| n.tier == NodeTier::Origin)
        {
            return Err(EdgeError::InvalidConfig {
                field: "topology.nodes".to_string(),
                reason: "Topology requires an origin node".to_string(),
            });
        }

        if let Some(active) = &self.providers.active {
            if !self.providers.providers.iter().any(|p| &p.name == active) {
                return Err(EdgeError::InvalidConfig {
                    field: "providers.active".to_string(),
                    reason: format!("Active provider '{}' is not listed", active),
                });
            }
        }

        Ok(())
    }

    /// Create a development configuration with a small in-process topology.
    pub fn development() -> Self {
        let nodes = vec![
            NodeSpec::new("edge-us-east", NodeTier::Edge),
            NodeSpec::new("edge-us-west", NodeTier::Edge),
            NodeSpec::new("edge-eu", NodeTier::Edge),
            NodeSpec::new("edge-global", NodeTier::Edge),
            NodeSpec::new("regional-us-east-1", NodeTier::Regional),
            NodeSpec::new("regional-us-west-1", NodeTier::Regional),
            NodeSpec::new("regional-eu-west-1", NodeTier::Regional),
            NodeSpec::new("origin", NodeTier::Origin),
        ];

        Self {
            providers: ProvidersConfig {
                enable_real_time_sync: true,
                active: Some("cloudflare".to_string()),
                providers: vec![
                    ProviderSpec {
                        name: "cloudflare".to_string(),
                        base_url: "https://cdn.example.com".to_string(),
                    },
                    ProviderSpec {
                        name: "fastly".to_string(),
                        base_url: "https://fastly.example.com".to_string(),
                    },
                ],
            },
            topology: TopologyConfig { nodes },
            observability: ObservabilityConfig {
                metrics_enabled: false,
                log_level: "debug".to_string(),
                ..ObservabilityConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Orchestrator behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Strategy used when a caller names none.
    pub default_strategy: StrategyKind,
    /// TTL applied when neither the caller nor a cache rule sets one.
    pub default_ttl_secs: u64,
    /// User location assumed when a caller names none.
    pub default_user_location: String,
    /// Timeout for a single node call.
    #[serde(with = "duration_format")]
    pub node_timeout: Duration,
    /// Timeout for a single provider call.
    #[serde(with = "duration_format")]
    pub provider_timeout: Duration,
    /// Outstanding provider uploads in a bulk upload.
    pub upload_concurrency: usize,
    /// Distinct (path, location) samples kept for training.
    pub access_log_capacity: usize,
    /// Predictions at or below this confidence are not warmed by the dispatcher.
    pub warmup_confidence_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::Smart,
            default_ttl_secs: 3600,
            default_user_location: "us-east".to_string(),
            node_timeout: Duration::from_secs(5),
            provider_timeout: Duration::from_secs(30),
            upload_concurrency: 5,
            access_log_capacity: 10_000,
            warmup_confidence_threshold: 0.7,
        }
    }
}

/// Strategy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Minimum confidence (exclusive) before the predictive strategy pins the global edge.
    pub predictive_confidence_threshold: f64,
    /// Location of the global edge node.
    pub global_edge: String,
    /// Coarse user location to concrete region.
    pub regions: HashMap<String, String>,
    /// Region used for unmapped locations.
    pub default_region: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let regions = [
            ("us-east", "us-east-1"),
            ("us-west", "us-west-1"),
            ("eu", "eu-west-1"),
            ("asia", "ap-southeast-1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            predictive_confidence_threshold: 0.7,
            global_edge: "edge-global".to_string(),
            regions,
            default_region: "us-east-1".to_string(),
        }
    }
}

impl StrategyConfig {
    /// Region for a coarse user location.
    pub fn region_for(&self, user_location: &str) -> &str {
        self.regions
            .get(user_location)
            .map(String::as_str)
            .unwrap_or(&self.default_region)
    }
}

/// Health state machine thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive node failures before `Failed`.
    pub node_fail_after: u32,
    /// Consecutive successes before a degraded node or provider is active again.
    pub recover_after: u32,
    /// Consecutive provider failures before it is queued for failover.
    pub provider_failover_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            node_fail_after: 5,
            recover_after: 3,
            provider_failover_threshold: 3,
        }
    }
}

/// Background timer cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    #[serde(with = "duration_format")]
    pub health_check_interval: Duration,
    #[serde(with = "duration_format")]
    pub provider_metrics_interval: Duration,
    #[serde(with = "duration_format")]
    pub training_interval: Duration,
    #[serde(with = "duration_format")]
    pub warmup_interval: Duration,
    /// Time each background task and the metrics server get to stop.
    #[serde(with = "duration_format")]
    pub shutdown_grace: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            provider_metrics_interval: Duration::from_secs(60),
            training_interval: Duration::from_secs(300),
            warmup_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// CDN provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Mirror invalidations and configuration between providers.
    pub enable_real_time_sync: bool,
    /// Provider receiving new uploads.
    pub active: Option<String>,
    /// Registered providers.
    pub providers: Vec<ProviderSpec>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enable_real_time_sync: true,
            active: None,
            providers: Vec::new(),
        }
    }
}

/// A provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub base_url: String,
}

/// Static node topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub nodes: Vec<NodeSpec>,
}

/// A node entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub location: String,
    pub tier: NodeTier,
    /// In-memory capacity for the development wiring.
    #[serde(default = "default_node_capacity")]
    pub capacity_bytes: u64,
}

fn default_node_capacity() -> u64 {
    256 * 1024 * 1024
}

impl NodeSpec {
    pub fn new(location: impl Into<String>, tier: NodeTier) -> Self {
        Self {
            location: location.into(),
            tier,
            capacity_bytes: default_node_capacity(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metrics bind address.
    pub metrics_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Durations as `"500ms"`, `"30s"`, `"5m"` or `"1h"`; a bare number is milliseconds.
pub mod duration_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Largest whole unit that represents the duration exactly.
    pub fn format_duration(duration: Duration) -> String {
        let ms = duration.as_millis();
        match ms {
            0 => "0s".to_string(),
            ms if ms % 3_600_000 == 0 => format!("{}h", ms / 3_600_000),
            ms if ms % 60_000 == 0 => format!("{}m", ms / 60_000),
            ms if ms % 1_000 == 0 => format!("{}s", ms / 1_000),
            ms => format!("{}ms", ms),
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let value = digits
            .parse::<u64>()
            .map_err(|e| format!("invalid duration '{}': {}", s, e))?;

        let ms_per_unit = match unit.trim() {
            "" | "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            other => return Err(format!("unknown duration unit '{}' in '{}'", other, s)),
        };
        value
            .checked_mul(ms_per_unit)
            .map(Duration::from_millis)
            .ok_or_else(|| format!("duration '{}' overflows", s))
    }
}
