//! Cache event notifications for edgeweave.
//!
//! Side-channel telemetry for integrations: observers register per event kind
//! with [`EventBus::on`], or take every event from a broadcast receiver.
//! Events are never required for correctness.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    ContentCached,
    CacheHit,
    CacheMiss,
    ContentInvalidated,
    CacheWarmupCompleted,
    ProviderSwitched,
    CacheRuleAdded,
    InvalidationRuleTriggered,

    // Failures
    CacheError,
    RetrievalError,
    InvalidationError,
    WarmupError,
    ProviderSwitchError,
    SyncError,
    HealthCheckError,
    TrainingError,
}

impl CacheEventKind {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CacheEventKind::CacheError
                | CacheEventKind::RetrievalError
                | CacheEventKind::InvalidationError
                | CacheEventKind::WarmupError
                | CacheEventKind::ProviderSwitchError
                | CacheEventKind::SyncError
                | CacheEventKind::HealthCheckError
                | CacheEventKind::TrainingError
        )
    }
}

/// A single event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEvent {
    pub id: Uuid,
    pub kind: CacheEventKind,
    pub timestamp: DateTime<Utc>,
    /// Kind-specific details.
    pub payload: serde_json::Value,
}

impl CacheEvent {
    pub fn new(kind: CacheEventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Observer callback.
pub type EventHandler = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Event bus statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBusStats {
    pub events_published: u64,
    /// Handler invocations.
    pub events_delivered: u64,
    /// Published while no broadcast receiver was listening.
    pub events_dropped: u64,
    pub observers: usize,
}

/// Event bus configuration.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Broadcast channel capacity.
    pub buffer_size: usize,
    /// Retained history size.
    pub history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            history_size: 1000,
        }
    }
}

#[derive(Default)]
struct EventBusStatsInner {
    events_published: AtomicU64,
    events_delivered: AtomicU64,
    events_dropped: AtomicU64,
}

/// Event bus.
pub struct EventBus {
    config: EventBusConfig,
    observers: RwLock<HashMap<CacheEventKind, Vec<EventHandler>>>,
    history: Mutex<VecDeque<CacheEvent>>,
    broadcast: broadcast::Sender<CacheEvent>,
    stats: EventBusStatsInner,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (broadcast, _) = broadcast::channel(config.buffer_size.max(1));
        Self {
            config,
            observers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            broadcast,
            stats: EventBusStatsInner::default(),
        }
    }

    /// Registers an observer for one event kind.
    pub fn on<F>(&self, kind: CacheEventKind, handler: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Receiver for every published event.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.broadcast.subscribe()
    }

    /// Publishes an event to observers, subscribers and history.
    pub fn publish(&self, event: CacheEvent) {
        self.stats.events_published.fetch_add(1, Ordering::Relaxed);
        trace!(kind = ?event.kind, id = %event.id, "Publishing event");

        let handlers: Vec<EventHandler> = self
            .observers
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(&event);
            self.stats.events_delivered.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut history = self.history.lock();
            if history.len() >= self.config.history_size {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        if self.broadcast.send(event).is_err() {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Shorthand for [`publish`](Self::publish).
    pub fn emit(&self, kind: CacheEventKind, payload: serde_json::Value) {
        self.publish(CacheEvent::new(kind, payload));
    }

    /// Most recent events, newest first.
    pub fn history(&self, limit: usize) -> Vec<CacheEvent> {
        self.history.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn history_of(&self, kind: CacheEventKind) -> Vec<CacheEvent> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            events_published: self.stats.events_published.load(Ordering::Relaxed),
            events_delivered: self.stats.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.stats.events_dropped.load(Ordering::Relaxed),
            observers: self.observers.read().values().map(Vec::len).sum(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
