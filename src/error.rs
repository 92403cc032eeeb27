//! Error types for edgeweave.
//!
//! This module provides a unified error type [`EdgeError`] for all orchestration
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Node**: a single cache node failed a read, write or invalidation
//! - **Provider**: a CDN vendor is unhealthy, missing, or could not be synced
//! - **Strategy**: node selection could not produce any candidate
//! - **Prediction**: model training or warmup source failures
//! - **Configuration**: invalid settings or missing configuration
//!
//! Per-node and per-provider failures are aggregated into operation results by the
//! orchestrator. Only [`EdgeError::NoCandidates`] and [`EdgeError::NoActiveProvider`]
//! are meant to reach callers as hard failures.
//!
//! # Example
//!
//! ```rust
//! use edgeweave::error::{EdgeError, Result};
//!
//! fn check_path(path: &str) -> Result<()> {
//!     if path.is_empty() {
//!         return Err(EdgeError::InvalidArgument("path cannot be empty".into()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_path("").is_err());
//! assert!(!EdgeError::NoActiveProvider.is_retryable());
//! ```

use std::io;
use thiserror::Error;

/// Main error type for edgeweave operations.
#[derive(Error, Debug)]
pub enum EdgeError {
    // Node errors
    #[error("Cache node {node} unavailable: {reason}")]
    NodeUnavailable { node: String, reason: String },

    // Provider errors
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("No active CDN provider configured")]
    NoActiveProvider,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Config sync from {from} to {to} failed: {reason}")]
    ConfigSync {
        from: String,
        to: String,
        reason: String,
    },

    // Strategy errors
    #[error("Unknown cache strategy: {0}")]
    UnknownStrategy(String),

    #[error("No candidate nodes for {0}")]
    NoCandidates(String),

    // Prediction errors
    #[error("Model training failed: {0}")]
    ModelTraining(String),

    #[error("Content source failed for {path}: {reason}")]
    ContentSource { path: String, reason: String },

    // Rule errors
    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // Network errors
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EdgeError {
    /// Shorthand for a node failure.
    pub fn node(node: impl Into<String>, reason: impl Into<String>) -> Self {
        EdgeError::NodeUnavailable {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a provider failure.
    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        EdgeError::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EdgeError::NodeUnavailable { .. }
                | EdgeError::ProviderUnavailable { .. }
                | EdgeError::Timeout(_)
                | EdgeError::ContentSource { .. }
        )
    }

    /// Errors that must surface to the caller instead of being folded into a result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EdgeError::NoCandidates(_) | EdgeError::NoActiveProvider)
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(e: serde_json::Error) -> Self {
        EdgeError::Serialization(e.to_string())
    }
}

/// Result type alias for edgeweave operations.
pub type Result<T> = std::result::Result<T, EdgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EdgeError::NoActiveProvider.is_fatal());
        assert!(EdgeError::NoCandidates("/a".into()).is_fatal());
        assert!(!EdgeError::node("edge-us-east", "down").is_fatal());
        assert!(!EdgeError::ModelTraining("empty".into()).is_fatal());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EdgeError::Timeout(5000).is_retryable());
        assert!(EdgeError::provider("cloudflare", "503").is_retryable());
        assert!(!EdgeError::InvalidArgument("ttl".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = EdgeError::node("origin", "connection reset");
        assert_eq!(err.to_string(), "Cache node origin unavailable: connection reset");
    }
}
