//! Shared Background Scheduler
//!
//! One tokio task drives every periodic job of the caching engine: TTL
//! sweeps, predictive preloading and file cache sweeps. Components register
//! a [`PeriodicTask`]; the scheduler ticks at the shortest registered
//! interval and runs each task once its own interval has elapsed.
//!
//! # Example
//!
//! ```ignore
//! let mut scheduler = Scheduler::new();
//! context.register_periodic_tasks(&mut scheduler);
//! let handle = scheduler.start();
//!
//! // Later
//! let report = handle.shutdown().await;
//! ```
//!
//! Task bodies are synchronous and run on the blocking pool, one at a time.
//! Shutdown is observed between ticks, so it may lag by up to one tick.

use docket_core::constants::MIN_SCHEDULER_TICK_MS;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

type TaskFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// A named job run every `interval`.
#[derive(Clone)]
pub struct PeriodicTask {
    name: String,
    interval: Duration,
    run: TaskFn,
}

impl fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}

impl PeriodicTask {
    pub fn new<F>(name: impl Into<String>, interval: Duration, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            interval,
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Run counts collected while the scheduler was alive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub ticks: u64,
    pub runs: BTreeMap<String, u64>,
    /// Runs that panicked.
    pub failures: u64,
}

/// Collects periodic tasks until [`Scheduler::start`].
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: PeriodicTask) {
        tracing::debug!(task = %task.name, interval_ms = task.interval.as_millis() as u64, "Registered periodic task");
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[PeriodicTask] {
        &self.tasks
    }

    /// Shortest registered interval, never below the minimum tick.
    pub fn tick_interval(&self) -> Duration {
        let floor = Duration::from_millis(MIN_SCHEDULER_TICK_MS);
        self.tasks
            .iter()
            .map(|task| task.interval)
            .min()
            .unwrap_or(floor)
            .max(floor)
    }

    /// Spawn the ticker on the current tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tick = self.tick_interval();
        let join = tokio::spawn(run_scheduler(self.tasks, tick, shutdown_rx));
        SchedulerHandle { shutdown_tx, join }
    }
}

/// Running scheduler. Dropping it without calling
/// [`SchedulerHandle::shutdown`] also stops the loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<SchedulerReport>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) -> SchedulerReport {
        let _ = self.shutdown_tx.send(true);
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Scheduler task ended abnormally");
                SchedulerReport::default()
            }
        }
    }
}

async fn run_scheduler(
    tasks: Vec<PeriodicTask>,
    tick: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> SchedulerReport {
    let mut report = SchedulerReport {
        runs: tasks.iter().map(|t| (t.name.clone(), 0)).collect(),
        ..Default::default()
    };

    let start = Instant::now();
    let mut next_due: Vec<Instant> = tasks.iter().map(|t| start + t.interval).collect();

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        tasks = tasks.len(),
        tick_ms = tick.as_millis() as u64,
        "Cache scheduler started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache scheduler shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                report.ticks += 1;
                let now = Instant::now();
                for (task, due) in tasks.iter().zip(next_due.iter_mut()) {
                    if now < *due {
                        continue;
                    }
                    *due = now + task.interval;

                    let run = task.run.clone();
                    match tokio::task::spawn_blocking(move || run()).await {
                        Ok(()) => {
                            *report.runs.entry(task.name.clone()).or_default() += 1;
                        }
                        Err(e) => {
                            tracing::error!(task = %task.name, error = %e, "Periodic task failed");
                            report.failures += 1;
                        }
                    }
                }
            }
        }
    }

    tracing::info!(
        ticks = report.ticks,
        failures = report.failures,
        "Cache scheduler stopped"
    );
    report
}
