//! Cache entry with age and TTL bookkeeping.

use docket_core::{elapsed_between, Timestamp};
use std::time::Duration;

/// A cached value plus the timestamps the TTL cache needs.
///
/// Expiry is a fixed window measured from `created_at`. Reads bump
/// `last_access` and `access_count` but never extend the lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    data: V,
    created_at: Timestamp,
    last_access: Timestamp,
    access_count: u64,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Create an entry stamped at `now`.
    pub fn new(data: V, now: Timestamp, ttl: Duration) -> Self {
        Self {
            data,
            created_at: now,
            last_access: now,
            access_count: 0,
            ttl,
        }
    }

    /// True once strictly more than `ttl` has passed since creation.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.age(now) > self.ttl
    }

    /// Record a read.
    pub fn touch(&mut self, now: Timestamp) {
        self.last_access = now;
        self.access_count += 1;
    }

    /// Time since creation.
    pub fn age(&self, now: Timestamp) -> Duration {
        elapsed_between(self.created_at, now)
    }

    pub fn data(&self) -> &V {
        &self.data
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_access(&self) -> Timestamp {
        self.last_access
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
