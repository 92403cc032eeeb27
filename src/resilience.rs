//! Resilience helpers shared by node and provider calls.
//!
//! Provides a per-call timeout wrapper and a consecutive-outcome health tracker
//! that drives the `active ⇄ degraded` transitions of nodes and providers.

use crate::error::{EdgeError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

// ============================================================================
// Timeout Wrapper
// ============================================================================

/// Execute an operation with a timeout. A timed-out call yields [`EdgeError::Timeout`].
pub async fn with_timeout<Fut, T>(timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| EdgeError::Timeout(timeout.as_millis() as u64))?
}

// ============================================================================
// Health Tracker
// ============================================================================

/// Coarse health level derived from consecutive check outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    /// Passing checks.
    Healthy,
    /// At least one recent failure, not yet recovered.
    Degraded,
    /// Failure streak reached the hard threshold.
    Down,
}

/// Thresholds for a [`HealthTracker`].
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Consecutive failures before `Down`.
    pub down_after: u32,
    /// Consecutive successes before `Healthy` again.
    pub recover_after: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            down_after: 5,
            recover_after: 3,
        }
    }
}

/// Tracks consecutive successes and failures of periodic checks.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    thresholds: HealthThresholds,
    level: HealthLevel,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            level: HealthLevel::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }

    pub fn level(&self) -> HealthLevel {
        self.level
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// Record a check outcome. Returns the new level if it changed.
    pub fn record(&mut self, healthy: bool) -> Option<HealthLevel> {
        let previous = self.level;

        if healthy {
            self.consecutive_failures = 0;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            if self.level != HealthLevel::Healthy
                && self.consecutive_successes >= self.thresholds.recover_after
            {
                self.level = HealthLevel::Healthy;
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.level = if self.consecutive_failures >= self.thresholds.down_after {
                HealthLevel::Down
            } else if self.level == HealthLevel::Down {
                HealthLevel::Down
            } else {
                HealthLevel::Degraded
            };
        }

        (self.level != previous).then_some(self.level)
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}
