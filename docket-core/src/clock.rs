//! Time source abstraction.
//!
//! Every component reads the current time through a [`Clock`] so expiry,
//! throttling and prediction can be driven deterministically in tests.

use crate::Timestamp;
use chrono::Utc;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Current UTC time.
    fn now(&self) -> Timestamp;
}

/// Shared, type-erased clock handed to every component.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

impl SystemClock {
    /// A [`SharedClock`] backed by the system clock.
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

/// Time elapsed from `earlier` to `now`, zero if `earlier` lies in the future.
pub fn elapsed_between(earlier: Timestamp, now: Timestamp) -> Duration {
    if now > earlier {
        (now - earlier).to_std().unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}
