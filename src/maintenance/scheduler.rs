//! Probabilistic maintenance scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;

use crate::config::MaintenanceConfig;
use crate::datastore::Connector;
use crate::maintenance::MaintenanceTask;
use crate::observability::metrics;
use crate::supervisor::ConnectionSupervisor;

type SharedTask<H> = Arc<dyn MaintenanceTask<H>>;

pub struct MaintenanceScheduler<C: Connector> {
    supervisor: ConnectionSupervisor<C>,
    config: MaintenanceConfig,
    tasks: Vec<SharedTask<C::Handle>>,
    running: Arc<AtomicBool>,
}

impl<C: Connector> MaintenanceScheduler<C> {
    pub fn new(supervisor: ConnectionSupervisor<C>, config: MaintenanceConfig) -> Self {
        Self {
            supervisor,
            config,
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_task(mut self, task: impl MaintenanceTask<C::Handle>) -> Self {
        self.register(task);
        self
    }

    pub fn register(&mut self, task: impl MaintenanceTask<C::Handle>) {
        tracing::debug!(task = task.name(), "Registered maintenance task");
        self.tasks.push(Arc::new(task));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether a request to `path` may trigger a run at all.
    pub fn qualifies(&self, path: &str) -> bool {
        self.config.enabled && !self.tasks.is_empty() && self.config.qualifies(path)
    }

    /// Roll the dice for a request to `path`; schedules a run on success.
    pub fn maybe_schedule(&self, path: &str) -> Option<JoinHandle<()>> {
        if !self.qualifies(path) {
            return None;
        }
        // A non-finite probability never fires.
        let probability = match self.config.probability {
            p if p.is_finite() => p.clamp(0.0, 1.0),
            _ => 0.0,
        };
        if !rand::thread_rng().gen_bool(probability) {
            return None;
        }
        self.schedule()
    }

    /// Schedule a run unconditionally, unless one is already pending.
    pub fn schedule(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!("Maintenance already running, skipping trigger");
            return None;
        }

        let supervisor = self.supervisor.clone();
        let tasks = self.tasks.clone();
        let running = Arc::clone(&self.running);
        let delay = Duration::from_millis(self.config.delay_ms);

        tracing::debug!(delay_ms = self.config.delay_ms, "Scheduling maintenance run");
        Some(tokio::spawn(async move {
            time::sleep(delay).await;
            run_tasks(&supervisor, &tasks).await;
            running.store(false, Ordering::Release);
        }))
    }
}

async fn run_tasks<C: Connector>(
    supervisor: &ConnectionSupervisor<C>,
    tasks: &[SharedTask<C::Handle>],
) {
    let handle = match supervisor.connect().await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping maintenance, datastore unavailable");
            metrics::record_maintenance_run("skipped");
            return;
        }
    };

    let mut set = JoinSet::new();
    for task in tasks {
        let task = Arc::clone(task);
        let handle = handle.clone();
        set.spawn(async move {
            let result = task.run(handle).await;
            (task.name().to_string(), result)
        });
    }

    let mut failures = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((name, Err(e))) => {
                failures += 1;
                tracing::error!(task = %name, error = %e, "Maintenance task failed");
            }
            Err(e) => {
                failures += 1;
                tracing::error!(error = %e, "Maintenance task panicked");
            }
        }
    }

    if failures == 0 {
        tracing::info!(tasks = tasks.len(), "Maintenance tasks completed");
        metrics::record_maintenance_run("success");
    } else {
        tracing::warn!(tasks = tasks.len(), failures, "Maintenance finished with failures");
        metrics::record_maintenance_run("failure");
    }
}
