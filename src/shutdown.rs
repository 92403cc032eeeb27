//! Graceful shutdown for the edgeweave service.
//!
//! A single flag fans out to the background timers and the metrics server.
//! Request/response calls already in flight are not cancelled.

use crate::error::{EdgeError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// One-way shutdown flag shared by the background loops, the metrics server
/// and the signal listener.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Receiver that sees the flag flip to `true`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flips the flag. Returns false if shutdown was already triggered.
    pub fn trigger(&self) -> bool {
        let first = self.tx.send_if_modified(|stopping| !std::mem::replace(stopping, true));
        if first {
            info!("Initiating graceful shutdown");
        }
        first
    }

    /// Resolves once shutdown has been triggered, including before the call.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns OS signals into a triggered [`Shutdown`].
pub struct SignalHandler {
    shutdown: Shutdown,
}

impl SignalHandler {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }

    /// Waits for SIGINT or SIGTERM, then triggers shutdown.
    #[cfg(unix)]
    pub async fn run(self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| EdgeError::Internal(format!("Failed to install {} handler: {}", name, e)))
        };
        let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
        let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = self.shutdown.wait() => return Ok(()),
        }

        self.shutdown.trigger();
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn run(self) -> Result<()> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| EdgeError::Internal(format!("Failed to install Ctrl+C handler: {}", e)))?;
                info!("Received Ctrl+C");
            }
            _ = self.shutdown.wait() => return Ok(()),
        }

        self.shutdown.trigger();
        Ok(())
    }
}
