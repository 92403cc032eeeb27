//! Cache nodes for edgeweave
//!
//! - Tier, status and metrics model
//! - Node-local backend trait and the in-memory node
//! - The node registry with health and EMA latency tracking

pub mod node;
pub mod registry;

pub use node::{CacheEntry, CacheNode, MemoryNode, NodeBackend, NodeMetrics, NodeStatus, NodeTier, Priority};
pub use registry::{NodeOutcome, NodeRef, NodeRegistry, RegisteredNode};
