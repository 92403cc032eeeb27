// Cache node model and node-local backends

use crate::error::{EdgeError, Result};
use crate::pattern::{is_beneath, GlobPattern};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeTier {
    /// Closest to users
    Edge,
    /// Regional mid-tier
    Regional,
    /// Source of truth
    Origin,
}

impl NodeTier {
    pub const ALL: [NodeTier; 3] = [NodeTier::Edge, NodeTier::Regional, NodeTier::Origin];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeTier::Edge => "edge",
            NodeTier::Regional => "regional",
            NodeTier::Origin => "origin",
        }
    }

    /// Conventional node location for a zone in this tier, e.g. `edge-us-east`.
    pub fn location_for(&self, zone: &str) -> String {
        format!("{}-{}", self.as_str(), zone)
    }
}

impl fmt::Display for NodeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeTier {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edge" => Ok(NodeTier::Edge),
            "regional" => Ok(NodeTier::Regional),
            "origin" => Ok(NodeTier::Origin),
            other => Err(EdgeError::InvalidArgument(format!("unknown tier: {}", other))),
        }
    }
}

/// Node health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Degraded,
    Failed,
}

/// Rolling node performance metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Exponential moving average of call latency
    pub response_time_ema_ms: f64,
    /// Read hit rate in percent (0-100)
    pub hit_rate: f64,
    /// Bytes written to the node, monotonically increasing
    pub bandwidth_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub failures: u64,
}

/// Snapshot of a registered cache node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheNode {
    pub location: String,
    pub tier: NodeTier,
    pub status: NodeStatus,
    pub metrics: NodeMetrics,
}

/// Write/read priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Entry handed to a node for storage
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: String,
    pub content: Bytes,
    pub ttl: Duration,
    pub tier: NodeTier,
    pub cached_at: DateTime<Utc>,
    pub priority: Priority,
}

impl CacheEntry {
    /// Creates an entry. The TTL must be positive.
    pub fn new(path: impl Into<String>, content: Bytes, ttl: Duration, tier: NodeTier) -> Result<Self> {
        if ttl.is_zero() {
            return Err(EdgeError::InvalidArgument("TTL must be positive".to_string()));
        }

        Ok(Self {
            path: path.into(),
            content,
            ttl,
            tier,
            cached_at: Utc::now(),
            priority: Priority::Normal,
        })
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Node-local cache operations.
///
/// One implementation per node transport; the orchestrator never inspects entries.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Stores an entry.
    async fn store(&self, entry: CacheEntry) -> Result<()>;

    /// Fetches content for a path, `None` on a miss.
    async fn fetch(&self, path: &str) -> Result<Option<Bytes>>;

    /// Invalidates paths; `recursive` also drops everything beneath each path.
    /// Returns the number of entries removed.
    async fn invalidate(&self, paths: &[String], recursive: bool) -> Result<u64>;

    /// Liveness probe.
    async fn health_check(&self) -> Result<()>;
}

/// Stored object in a [`MemoryNode`]
#[derive(Debug, Clone)]
struct StoredObject {
    content: Bytes,
    expires_at: Instant,
    size: u64,
}

impl StoredObject {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Memory node statistics
#[derive(Default)]
struct MemoryNodeStats {
    evictions: AtomicU64,
    expired: AtomicU64,
}

/// Objects plus their total size; both change under one guard.
struct NodeStore {
    objects: LruCache<String, StoredObject>,
    size: u64,
}

impl NodeStore {
    fn remove(&mut self, key: &str) -> Option<StoredObject> {
        let obj = self.objects.pop(key)?;
        self.size -= obj.size;
        Some(obj)
    }
}

/// In-process cache node with TTL expiry and LRU eviction.
pub struct MemoryNode {
    name: String,
    capacity: u64,
    store: RwLock<NodeStore>,
    /// Mirror of `NodeStore::size` for synchronous reads.
    current_size: AtomicU64,
    stats: MemoryNodeStats,
    available: AtomicBool,
}

impl MemoryNode {
    /// Creates a new memory node
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            capacity,
            store: RwLock::new(NodeStore {
                objects: LruCache::unbounded(),
                size: 0,
            }),
            current_size: AtomicU64::new(0),
            stats: MemoryNodeStats::default(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub async fn object_count(&self) -> usize {
        self.store.read().await.objects.len()
    }

    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.stats.evictions.load(Ordering::Relaxed)
    }

    pub fn expired(&self) -> u64 {
        self.stats.expired.load(Ordering::Relaxed)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(EdgeError::node(&self.name, "node offline"))
        }
    }

    fn publish_size(&self, store: &NodeStore) {
        self.current_size.store(store.size, Ordering::Relaxed);
    }
}

#[async_trait]
impl NodeBackend for MemoryNode {
    async fn store(&self, entry: CacheEntry) -> Result<()> {
        self.ensure_available()?;

        let size = entry.size();
        if size > self.capacity {
            return Err(EdgeError::InvalidArgument(format!(
                "object of {} bytes exceeds node capacity",
                size
            )));
        }

        let mut store = self.store.write().await;
        store.remove(&entry.path);

        while store.size + size > self.capacity {
            match store.objects.pop_lru() {
                Some((_, evicted)) => {
                    store.size -= evicted.size;
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        let obj = StoredObject {
            content: entry.content,
            expires_at: Instant::now() + entry.ttl,
            size,
        };
        store.objects.put(entry.path, obj);
        store.size += size;
        self.publish_size(&store);

        Ok(())
    }

    async fn fetch(&self, path: &str) -> Result<Option<Bytes>> {
        self.ensure_available()?;

        // `get` promotes the entry in LRU order, so this needs the write guard.
        let mut store = self.store.write().await;
        match store.objects.get(path) {
            Some(obj) if !obj.is_expired() => return Ok(Some(obj.content.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        store.remove(path);
        self.stats.expired.fetch_add(1, Ordering::Relaxed);
        self.publish_size(&store);
        Ok(None)
    }

    async fn invalidate(&self, paths: &[String], recursive: bool) -> Result<u64> {
        self.ensure_available()?;

        let globs = paths
            .iter()
            .filter(|p| p.contains('*'))
            .map(|p| GlobPattern::new(p))
            .collect::<Result<Vec<_>>>()?;

        let mut store = self.store.write().await;
        let mut keys: Vec<String> = store
            .objects
            .iter()
            .map(|(key, _)| key)
            .filter(|key| {
                globs.iter().any(|g| g.matches(key))
                    || paths.iter().filter(|p| !p.contains('*')).any(|p| {
                        if recursive {
                            is_beneath(key, p)
                        } else {
                            *key == p
                        }
                    })
            })
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();

        let removed = keys.iter().filter(|key| store.remove(key).is_some()).count() as u64;
        self.publish_size(&store);
        Ok(removed)
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, bytes: &[u8]) -> CacheEntry {
        CacheEntry::new(
            path,
            Bytes::copy_from_slice(bytes),
            Duration::from_secs(60),
            NodeTier::Edge,
        )
        .unwrap()
    }

    #[test]
    fn test_entry_rejects_zero_ttl() {
        let result = CacheEntry::new("/a", Bytes::new(), Duration::ZERO, NodeTier::Edge);
        assert!(result.is_err());
    }

    #[test]
    fn test_tier_location_convention() {
        assert_eq!(NodeTier::Edge.location_for("us-east"), "edge-us-east");
        assert_eq!(
            NodeTier::Regional.location_for("us-east-1"),
            "regional-us-east-1"
        );
        assert_eq!("Regional".parse::<NodeTier>().unwrap(), NodeTier::Regional);
    }

    #[tokio::test]
    async fn test_memory_node_basic() {
        let node = MemoryNode::new("edge-us-east", 1024 * 1024);
        node.store(entry("/static/app.js", b"console.log(1)")).await.unwrap();

        let content = node.fetch("/static/app.js").await.unwrap();
        assert_eq!(content, Some(Bytes::from_static(b"console.log(1)")));
        assert_eq!(node.fetch("/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_node_eviction() {
        let node = MemoryNode::new("edge-us-east", 100);

        node.store(entry("/a", &[0u8; 50])).await.unwrap();
        node.store(entry("/b", &[0u8; 50])).await.unwrap();

        // Evicts /a
        node.store(entry("/c", &[0u8; 50])).await.unwrap();

        assert!(node.fetch("/a").await.unwrap().is_none());
        assert!(node.fetch("/c").await.unwrap().is_some());
        assert_eq!(node.evictions(), 1);
    }

    #[tokio::test]
    async fn test_memory_node_expiration() {
        let node = MemoryNode::new("edge-us-east", 1024);
        let short = CacheEntry::new(
            "/a",
            Bytes::from_static(b"x"),
            Duration::from_millis(1),
            NodeTier::Edge,
        )
        .unwrap();
        node.store(short).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(node.fetch("/a").await.unwrap().is_none());
        assert_eq!(node.current_size(), 0);
    }

    #[tokio::test]
    async fn test_memory_node_invalidation_modes() {
        let node = MemoryNode::new("regional-us-east-1", 1024);
        for path in ["/img/a.png", "/img/b.png", "/img/thumbs/c.png", "/css/site.css"] {
            node.store(entry(path, b"x")).await.unwrap();
        }

        assert_eq!(node.invalidate(&["/img/a.png".into()], false).await.unwrap(), 1);
        assert_eq!(node.invalidate(&["/img/a.png".into()], false).await.unwrap(), 0);
        assert_eq!(node.invalidate(&["/img/".into()], true).await.unwrap(), 2);
        assert_eq!(node.invalidate(&["*.css".into()], false).await.unwrap(), 1);
        assert_eq!(node.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_recursive_invalidation_stops_at_segment_boundary() {
        let node = MemoryNode::new("regional-us-east-1", 1024);
        for path in ["/img", "/img/a.png", "/images/x.png", "/imgx"] {
            node.store(entry(path, b"x")).await.unwrap();
        }

        assert_eq!(node.invalidate(&["/img".into()], true).await.unwrap(), 2);
        assert!(node.fetch("/images/x.png").await.unwrap().is_some());
        assert!(node.fetch("/imgx").await.unwrap().is_some());
        assert_eq!(node.current_size(), 2);
    }

    #[tokio::test]
    async fn test_eviction_follows_recent_reads() {
        let node = MemoryNode::new("edge-us-east", 100);
        node.store(entry("/a", &[0u8; 50])).await.unwrap();
        node.store(entry("/b", &[0u8; 50])).await.unwrap();

        // Reading /a makes /b the least recently used.
        node.fetch("/a").await.unwrap();
        node.store(entry("/c", &[0u8; 50])).await.unwrap();

        assert!(node.fetch("/a").await.unwrap().is_some());
        assert!(node.fetch("/b").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overwrites_keep_size_consistent() {
        let node = std::sync::Arc::new(MemoryNode::new("edge-us-east", 1024 * 1024));

        let writers: Vec<_> = (0..64)
            .map(|_| {
                let node = node.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        node.store(entry("/static/app.js", &[7u8; 100])).await.unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(node.object_count().await, 1);
        assert_eq!(node.current_size(), 100);
        assert_eq!(node.evictions(), 0);

        node.invalidate(&["/static/app.js".into()], false).await.unwrap();
        assert_eq!(node.current_size(), 0);
    }

    #[tokio::test]
    async fn test_memory_node_offline() {
        let node = MemoryNode::new("origin", 1024);
        node.set_available(false);

        assert!(node.store(entry("/a", b"x")).await.is_err());
        assert!(node.fetch("/a").await.is_err());
        assert!(node.health_check().await.is_err());

        node.set_available(true);
        assert!(node.health_check().await.is_ok());
    }
}
