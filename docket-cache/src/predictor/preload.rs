//! Preload hooks and run reports.
//!
//! The predictor decides what to preload and how many; a [`Preloader`]
//! registered by the persistence layer decides how.

use docket_core::PreloadError;
use serde::Serialize;
use std::fmt;

/// Fetch-and-populate hook for one entity type or one view.
pub trait Preloader: Send + Sync {
    /// Populate caches for `key` (an entity id, or a view name).
    fn preload(&self, key: &str) -> Result<(), PreloadError>;
}

impl<F> Preloader for F
where
    F: Fn(&str) -> Result<(), PreloadError> + Send + Sync,
{
    fn preload(&self, key: &str) -> Result<(), PreloadError> {
        self(key)
    }
}

/// Something the predictor decided to warm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreloadTarget {
    Entity {
        entity_type: String,
        entity_id: String,
    },
    View {
        view: String,
    },
}

impl PreloadTarget {
    /// Key handed to the hook.
    pub fn key(&self) -> &str {
        match self {
            PreloadTarget::Entity { entity_id, .. } => entity_id,
            PreloadTarget::View { view } => view,
        }
    }
}

impl fmt::Display for PreloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreloadTarget::Entity {
                entity_type,
                entity_id,
            } => write!(f, "{entity_type}/{entity_id}"),
            PreloadTarget::View { view } => write!(f, "view:{view}"),
        }
    }
}

/// Outcome of one `preload()` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreloadReport {
    /// False when the call fell inside the warmup throttle window.
    pub ran: bool,
    /// Actions admitted this run, in dispatch order.
    pub planned: Vec<PreloadTarget>,
    /// Candidates dropped by the concurrency cap.
    pub deferred: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Admitted actions with no registered hook.
    pub skipped: usize,
    /// Records dropped by history trimming, if it ran.
    pub trimmed: Option<usize>,
}

impl PreloadReport {
    pub(crate) fn throttled() -> Self {
        Self::default()
    }
}
