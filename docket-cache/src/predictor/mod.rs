//! Access predictor.
//!
//! Observes reads reported by the TTL cache and navigation events reported by
//! the UI, estimates how likely an entity is to be read again, and warms the
//! most likely ones through injected [`Preloader`] hooks.
//!
//! # Locking
//!
//! All histories sit behind one mutex. Hooks are always invoked after that
//! mutex is released, so a hook may read through the TTL cache (which reports
//! back into the predictor) without deadlocking.
//!
//! # Throttling
//!
//! [`AccessPredictor::preload`] is cheap to call often: it does nothing until
//! `cache_warmup_interval` has passed since the previous run, and it trims
//! histories older than `history_retention` only once per `cleanup_interval`.

pub mod preload;
pub mod probability;

pub use preload::{PreloadReport, PreloadTarget, Preloader};
pub use probability::access_probability;

use docket_core::{elapsed_between, PredictiveConfig, SharedClock, Timestamp};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// One observed read of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub timestamp: Timestamp,
}

/// One observed view change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRecord {
    pub view_name: String,
    pub timestamp: Timestamp,
}

/// Snapshot of predictor activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictorStats {
    pub tracked_types: usize,
    pub tracked_entities: usize,
    pub access_records: usize,
    pub navigation_records: usize,
    pub preload_runs: u64,
    pub preloads_dispatched: u64,
    pub preloads_failed: u64,
    pub preloads_skipped: u64,
    pub last_preload: Option<Timestamp>,
}

#[derive(Debug)]
struct PredictorState {
    access_history: HashMap<String, VecDeque<AccessRecord>>,
    navigation_history: VecDeque<NavigationRecord>,
    last_preload: Option<Timestamp>,
    last_history_cleanup: Timestamp,
    preload_runs: u64,
    preloads_dispatched: u64,
    preloads_failed: u64,
    preloads_skipped: u64,
}

#[derive(Default)]
struct PreloadHooks {
    entities: HashMap<String, Arc<dyn Preloader>>,
    views: HashMap<String, Arc<dyn Preloader>>,
}

/// Recency/frequency access predictor with bounded speculative preloading.
pub struct AccessPredictor {
    state: Mutex<PredictorState>,
    hooks: RwLock<PreloadHooks>,
    config: PredictiveConfig,
    clock: SharedClock,
}

impl std::fmt::Debug for AccessPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPredictor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AccessPredictor {
    /// Create a predictor with empty histories.
    pub fn new(config: PredictiveConfig, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(PredictorState {
                access_history: HashMap::new(),
                navigation_history: VecDeque::new(),
                last_preload: None,
                last_history_cleanup: now,
                preload_runs: 0,
                preloads_dispatched: 0,
                preloads_failed: 0,
                preloads_skipped: 0,
            }),
            hooks: RwLock::new(PreloadHooks::default()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &PredictiveConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PredictorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Access predictor lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    // ========================================================================
    // RECORDING
    // ========================================================================

    /// Append a read of `entity_type/entity_id`, dropping the oldest record
    /// of that type past `max_history_size`.
    pub fn record_access(&self, entity_type: &str, entity_id: &str) {
        let now = self.clock.now();
        let max = self.config.max_history_size;
        let mut state = self.lock();
        let history = state
            .access_history
            .entry(entity_type.to_string())
            .or_default();
        history.push_back(AccessRecord {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            timestamp: now,
        });
        while history.len() > max {
            history.pop_front();
        }
    }

    /// Append a view change to the global navigation history.
    pub fn record_navigation(&self, view: &str) {
        let now = self.clock.now();
        let max = self.config.max_history_size;
        let mut state = self.lock();
        state.navigation_history.push_back(NavigationRecord {
            view_name: view.to_string(),
            timestamp: now,
        });
        while state.navigation_history.len() > max {
            state.navigation_history.pop_front();
        }
    }

    // ========================================================================
    // PREDICTION
    // ========================================================================

    /// Likelihood in `[0, 1]` that `entity_type/entity_id` is read again soon.
    pub fn predict_access_probability(&self, entity_type: &str, entity_id: &str) -> f64 {
        let now = self.clock.now();
        let timestamps = {
            let state = self.lock();
            state
                .access_history
                .get(entity_type)
                .map(|history| timestamps_for(history, entity_id))
                .unwrap_or_default()
        };
        access_probability(&timestamps, now)
    }

    /// Views usually opened after the most recently recorded one.
    pub fn predict_next_navigation(&self) -> Vec<String> {
        let state = self.lock();
        self.next_views(&state)
    }

    fn next_views(&self, state: &PredictorState) -> Vec<String> {
        state
            .navigation_history
            .back()
            .and_then(|last| self.config.navigation_patterns.get(&last.view_name))
            .cloned()
            .unwrap_or_default()
    }

    /// Access timestamps recorded for one entity, oldest first.
    pub fn access_history(&self, entity_type: &str, entity_id: &str) -> Vec<Timestamp> {
        let state = self.lock();
        state
            .access_history
            .get(entity_type)
            .map(|history| timestamps_for(history, entity_id))
            .unwrap_or_default()
    }

    // ========================================================================
    // PRELOADING
    // ========================================================================

    /// Bind the hook that fetches entities of `entity_type`.
    pub fn register_preloader(&self, entity_type: impl Into<String>, hook: Arc<dyn Preloader>) {
        self.write_hooks().entities.insert(entity_type.into(), hook);
    }

    /// Bind the hook that warms data shown by `view`.
    pub fn register_view_preloader(&self, view: impl Into<String>, hook: Arc<dyn Preloader>) {
        self.write_hooks().views.insert(view.into(), hook);
    }

    fn write_hooks(&self) -> std::sync::RwLockWriteGuard<'_, PreloadHooks> {
        self.hooks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hook_for(&self, target: &PreloadTarget) -> Option<Arc<dyn Preloader>> {
        let hooks = self.hooks.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match target {
            PreloadTarget::Entity { entity_type, .. } => hooks.entities.get(entity_type).cloned(),
            PreloadTarget::View { view } => hooks.views.get(view).cloned(),
        }
    }

    /// Run one throttled preload pass.
    ///
    /// Candidates are every tracked entity whose probability exceeds
    /// `prediction_threshold` (most likely first), followed by the predicted
    /// next views. At most `max_concurrent_preloads` of them are dispatched.
    pub fn preload(&self) -> PreloadReport {
        let now = self.clock.now();

        let (planned, deferred, trimmed) = {
            let mut state = self.lock();

            if let Some(last) = state.last_preload {
                if elapsed_between(last, now) < self.config.cache_warmup_interval {
                    return PreloadReport::throttled();
                }
            }
            state.last_preload = Some(now);
            state.preload_runs += 1;

            let trimmed = if elapsed_between(state.last_history_cleanup, now)
                >= self.config.cleanup_interval
            {
                state.last_history_cleanup = now;
                Some(self.trim_history(&mut state, now))
            } else {
                None
            };

            let mut candidates = self.entity_candidates(&state, now);
            candidates.extend(
                self.next_views(&state)
                    .into_iter()
                    .map(|view| PreloadTarget::View { view }),
            );

            let cap = self.config.performance_settings.max_concurrent_preloads;
            let deferred = candidates.len().saturating_sub(cap);
            candidates.truncate(cap);
            (candidates, deferred, trimmed)
        };

        let mut report = PreloadReport {
            ran: true,
            planned,
            deferred,
            trimmed,
            ..Default::default()
        };

        for target in &report.planned {
            let Some(hook) = self.hook_for(target) else {
                tracing::debug!(target = %target, "No preloader registered, skipping");
                report.skipped += 1;
                continue;
            };
            match hook.preload(target.key()) {
                Ok(()) => {
                    tracing::debug!(target = %target, "Preloaded");
                    report.dispatched += 1;
                }
                Err(e) => {
                    tracing::warn!(target = %target, error = %e, "Preload failed");
                    report.failed += 1;
                }
            }
        }

        {
            let mut state = self.lock();
            state.preloads_dispatched += report.dispatched as u64;
            state.preloads_failed += report.failed as u64;
            state.preloads_skipped += report.skipped as u64;
        }

        if !report.planned.is_empty() {
            tracing::info!(
                planned = report.planned.len(),
                deferred = report.deferred,
                dispatched = report.dispatched,
                failed = report.failed,
                "Preload run completed"
            );
        }

        report
    }

    fn entity_candidates(&self, state: &PredictorState, now: Timestamp) -> Vec<PreloadTarget> {
        let mut scored: Vec<(f64, &str, &str)> = Vec::new();

        for (entity_type, history) in &state.access_history {
            let mut per_entity: HashMap<&str, Vec<Timestamp>> = HashMap::new();
            for record in history {
                per_entity
                    .entry(record.entity_id.as_str())
                    .or_default()
                    .push(record.timestamp);
            }
            for (entity_id, timestamps) in per_entity {
                let p = access_probability(&timestamps, now);
                if p > self.config.prediction_threshold {
                    scored.push((p, entity_type.as_str(), entity_id));
                }
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
                .then_with(|| a.2.cmp(b.2))
        });

        scored
            .into_iter()
            .map(|(_, entity_type, entity_id)| PreloadTarget::Entity {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            })
            .collect()
    }

    fn trim_history(&self, state: &mut PredictorState, now: Timestamp) -> usize {
        let retention = self.config.history_retention;
        let mut removed = 0;

        for history in state.access_history.values_mut() {
            let before = history.len();
            history.retain(|record| elapsed_between(record.timestamp, now) <= retention);
            removed += before - history.len();
        }
        state.access_history.retain(|_, history| !history.is_empty());

        let before = state.navigation_history.len();
        state
            .navigation_history
            .retain(|record| elapsed_between(record.timestamp, now) <= retention);
        removed += before - state.navigation_history.len();

        tracing::debug!(removed, "Trimmed access history");
        removed
    }

    // ========================================================================
    // STATS
    // ========================================================================

    pub fn get_stats(&self) -> PredictorStats {
        let state = self.lock();
        let tracked_entities = state
            .access_history
            .values()
            .map(|history| {
                let mut ids: Vec<&str> = history.iter().map(|r| r.entity_id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                ids.len()
            })
            .sum();

        PredictorStats {
            tracked_types: state.access_history.len(),
            tracked_entities,
            access_records: state.access_history.values().map(VecDeque::len).sum(),
            navigation_records: state.navigation_history.len(),
            preload_runs: state.preload_runs,
            preloads_dispatched: state.preloads_dispatched,
            preloads_failed: state.preloads_failed,
            preloads_skipped: state.preloads_skipped,
            last_preload: state.last_preload,
        }
    }
}

fn timestamps_for(history: &VecDeque<AccessRecord>, entity_id: &str) -> Vec<Timestamp> {
    history
        .iter()
        .filter(|record| record.entity_id == entity_id)
        .map(|record| record.timestamp)
        .collect()
}
