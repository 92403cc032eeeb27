// Periodic orchestrator work

use super::EdgeCacheOrchestrator;
use crate::config::ScheduleConfig;
use crate::shutdown::Shutdown;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const HEALTH_CHECK: &str = "health-check";
pub const PROVIDER_METRICS: &str = "provider-metrics";
pub const MODEL_TRAINING: &str = "model-training";
pub const WARMUP: &str = "warmup";

struct Task {
    name: &'static str,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The four interval loops. Each can be stopped on its own; all stop once shutdown is triggered.
pub struct BackgroundTasks {
    tasks: Vec<Task>,
}

impl BackgroundTasks {
    /// Spawns every loop on the current runtime.
    pub fn spawn(
        orchestrator: Arc<EdgeCacheOrchestrator>,
        schedule: &ScheduleConfig,
        shutdown: &Shutdown,
    ) -> Self {
        let mut tasks = Vec::with_capacity(4);

        let o = orchestrator.clone();
        tasks.push(spawn_loop(HEALTH_CHECK, schedule.health_check_interval, shutdown, move || {
            let o = o.clone();
            async move {
                let summary = o.run_health_checks().await;
                debug!(nodes = summary.nodes.len(), providers = summary.providers.len(), "Health checks done");
            }
        }));

        let o = orchestrator.clone();
        tasks.push(spawn_loop(PROVIDER_METRICS, schedule.provider_metrics_interval, shutdown, move || {
            let o = o.clone();
            async move {
                o.roll_up_provider_metrics().await;
            }
        }));

        let o = orchestrator.clone();
        tasks.push(spawn_loop(MODEL_TRAINING, schedule.training_interval, shutdown, move || {
            let o = o.clone();
            async move {
                o.train_model().await;
            }
        }));

        let o = orchestrator;
        tasks.push(spawn_loop(WARMUP, schedule.warmup_interval, shutdown, move || {
            let o = o.clone();
            async move {
                o.dispatch_warmup().await;
            }
        }));

        info!(tasks = tasks.len(), "Background tasks started");
        Self { tasks }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name).collect()
    }

    /// Stops one loop. Returns false for an unknown name.
    pub fn stop(&self, name: &str) -> bool {
        match self.tasks.iter().find(|t| t.name == name) {
            Some(task) => {
                let _ = task.stop.send(true);
                true
            }
            None => false,
        }
    }

    pub fn is_finished(&self, name: &str) -> Option<bool> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.handle.is_finished())
    }

    /// Stops every loop and waits up to `timeout` for each to exit.
    pub async fn shutdown(self, timeout: Duration) {
        for task in &self.tasks {
            let _ = task.stop.send(true);
        }
        for task in self.tasks {
            match tokio::time::timeout(timeout, task.handle).await {
                Ok(Ok(())) => debug!(task = task.name, "Background task stopped"),
                Ok(Err(e)) => warn!(task = task.name, error = %e, "Background task panicked"),
                Err(_) => warn!(task = task.name, "Background task did not stop in time"),
            }
        }
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: &Shutdown,
    tick: F,
) -> Task
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (stop, mut stopped) = watch::channel(false);
    let shutdown = shutdown.clone();

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                _ = stopped.changed() => break,
                _ = shutdown.wait() => break,
            }
        }

        info!(task = name, "Background task exiting");
    });

    Task { name, stop, handle }
}
