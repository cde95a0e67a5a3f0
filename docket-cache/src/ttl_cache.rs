//! Namespaced TTL cache.
//!
//! Entries live in `namespace -> key -> CacheEntry` maps behind a single
//! mutex. Expiry is lazy on read and periodic through [`TtlCache::cleanup`].
//! Every hit is reported to the [`AccessPredictor`] after the lock is
//! released.

use crate::entry::CacheEntry;
use crate::predictor::{AccessPredictor, PredictorStats};
use docket_core::{elapsed_between, CacheConfig, SharedClock, Timestamp};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Per-namespace snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NamespaceStats {
    pub entries: usize,
    pub total_accesses: u64,
    /// Mean TTL of live entries; zero when the namespace is empty.
    pub mean_ttl_secs: f64,
}

/// Snapshot of the TTL cache and its predictor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TtlCacheStats {
    pub namespaces: BTreeMap<String, NamespaceStats>,
    pub sweeps: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub predictor: PredictorStats,
}

#[derive(Debug)]
struct TtlState<V> {
    namespaces: HashMap<String, HashMap<String, CacheEntry<V>>>,
    last_cleanup: Option<Timestamp>,
    sweeps: u64,
    hits: u64,
    misses: u64,
    expired: u64,
}

/// Generic namespaced cache with per-namespace default TTLs.
#[derive(Debug)]
pub struct TtlCache<V = serde_json::Value> {
    state: Mutex<TtlState<V>>,
    config: CacheConfig,
    predictor: Arc<AccessPredictor>,
    clock: SharedClock,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(config: CacheConfig, predictor: Arc<AccessPredictor>, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(TtlState {
                namespaces: HashMap::new(),
                last_cleanup: None,
                sweeps: 0,
                hits: 0,
                misses: 0,
                expired: 0,
            }),
            config,
            predictor,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn predictor(&self) -> &Arc<AccessPredictor> {
        &self.predictor
    }

    fn lock(&self) -> MutexGuard<'_, TtlState<V>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("TTL cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Fetch a live value, expiring it first if its TTL has passed.
    pub fn get(&self, namespace: &str, key: &str) -> Option<V> {
        let now = self.clock.now();
        let value = {
            let mut state = self.lock();
            let expired = state
                .namespaces
                .get(namespace)
                .and_then(|entries| entries.get(key))
                .map(|entry| entry.is_expired(now));

            match expired {
                None => {
                    state.misses += 1;
                    None
                }
                Some(true) => {
                    if let Some(entries) = state.namespaces.get_mut(namespace) {
                        entries.remove(key);
                    }
                    state.misses += 1;
                    state.expired += 1;
                    tracing::debug!(namespace, key, "Expired on read");
                    None
                }
                Some(false) => {
                    let value = state
                        .namespaces
                        .get_mut(namespace)
                        .and_then(|entries| entries.get_mut(key))
                        .map(|entry| {
                            entry.touch(now);
                            entry.data().clone()
                        });
                    state.hits += 1;
                    value
                }
            }
        };

        if value.is_some() {
            self.predictor.record_access(namespace, key);
        }
        value
    }

    /// Store `value` under the namespace's configured TTL.
    pub fn set(&self, namespace: &str, key: &str, value: V) {
        let ttl = self.config.ttl_for(namespace);
        self.set_with_ttl(namespace, key, value, ttl);
    }

    /// Store `value` with an explicit TTL.
    pub fn set_with_ttl(&self, namespace: &str, key: &str, value: V, ttl: Duration) {
        let now = self.clock.now();
        let mut state = self.lock();
        state
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), CacheEntry::new(value, now, ttl));
    }

    /// Remove one key; true if it was present.
    pub fn delete(&self, namespace: &str, key: &str) -> bool {
        let mut state = self.lock();
        state
            .namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .is_some()
    }

    /// Drop one namespace, or every namespace with `None`.
    pub fn clear(&self, namespace: Option<&str>) {
        let mut state = self.lock();
        match namespace {
            Some(ns) => {
                state.namespaces.remove(ns);
            }
            None => state.namespaces.clear(),
        }
    }

    /// True if a live entry exists. Does not count as an access.
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        let now = self.clock.now();
        let state = self.lock();
        state
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Stored entries in a namespace, including ones not yet swept.
    pub fn len(&self, namespace: &str) -> usize {
        let state = self.lock();
        state.namespaces.get(namespace).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.namespaces.values().all(HashMap::is_empty)
    }

    /// Sweep expired entries from every namespace.
    ///
    /// Returns `None` when called within `cleanup_interval` of the previous
    /// sweep. The first call always sweeps.
    pub fn cleanup(&self) -> Option<usize> {
        let now = self.clock.now();
        let mut state = self.lock();

        if let Some(last) = state.last_cleanup {
            if elapsed_between(last, now) < self.config.cleanup_interval {
                return None;
            }
        }

        let mut removed = 0;
        for entries in state.namespaces.values_mut() {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            removed += before - entries.len();
        }

        state.last_cleanup = Some(now);
        state.sweeps += 1;
        state.expired += removed as u64;

        tracing::info!(removed, namespaces = state.namespaces.len(), "TTL cache sweep");
        Some(removed)
    }

    pub fn get_stats(&self) -> TtlCacheStats {
        let mut stats = {
            let state = self.lock();
            let namespaces = state
                .namespaces
                .iter()
                .map(|(name, entries)| {
                    let total_ttl: f64 = entries.values().map(|e| e.ttl().as_secs_f64()).sum();
                    let ns = NamespaceStats {
                        entries: entries.len(),
                        total_accesses: entries.values().map(CacheEntry::access_count).sum(),
                        mean_ttl_secs: if entries.is_empty() {
                            0.0
                        } else {
                            total_ttl / entries.len() as f64
                        },
                    };
                    (name.clone(), ns)
                })
                .collect();

            TtlCacheStats {
                namespaces,
                sweeps: state.sweeps,
                hits: state.hits,
                misses: state.misses,
                expired: state.expired,
                predictor: PredictorStats::default(),
            }
        };
        stats.predictor = self.predictor.get_stats();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::PredictiveConfig;
    use docket_test_utils::generators::{arb_json_value, arb_key, arb_namespace, arb_ttl_secs};
    use docket_test_utils::{shared, ManualClock};
    use proptest::prelude::*;
    use serde_json::json;

    fn cache_with(config: CacheConfig) -> (Arc<ManualClock>, TtlCache) {
        let clock = ManualClock::fixed();
        let predictor = Arc::new(AccessPredictor::new(
            PredictiveConfig::default(),
            shared(&clock),
        ));
        let cache = TtlCache::new(config, predictor, shared(&clock));
        (clock, cache)
    }

    fn cache() -> (Arc<ManualClock>, TtlCache) {
        cache_with(CacheConfig::default())
    }

    #[test]
    fn test_set_then_get() {
        let (_clock, cache) = cache();
        cache.set("clients", "c1", json!({"name": "Acme"}));
        assert_eq!(cache.get("clients", "c1"), Some(json!({"name": "Acme"})));
        assert_eq!(cache.get("clients", "c2"), None);
        assert_eq!(cache.get("templates", "c1"), None);
    }

    #[test]
    fn test_set_overwrites_only_its_key() {
        let (_clock, cache) = cache();
        cache.set("clients", "c1", json!(1));
        cache.set("clients", "c2", json!(2));
        cache.set("clients", "c1", json!(3));
        assert_eq!(cache.get("clients", "c1"), Some(json!(3)));
        assert_eq!(cache.get("clients", "c2"), Some(json!(2)));
    }

    #[test]
    fn test_namespace_ttl_applies() {
        let config = CacheConfig::default().with_namespace_ttl("documents", Duration::from_secs(2));
        let (clock, cache) = cache_with(config);
        cache.set("documents", "d1", json!("v"));
        cache.set("clients", "c1", json!("v"));

        clock.advance_secs(2.5);
        assert_eq!(cache.get("documents", "d1"), None);
        // Unconfigured namespace falls back to the default hour
        assert_eq!(cache.get("clients", "c1"), Some(json!("v")));
    }

    #[test]
    fn test_expired_read_removes_entry_but_keeps_namespace() {
        let (clock, cache) = cache();
        cache.set_with_ttl("documents", "d1", json!("v"), Duration::from_secs(1));
        clock.advance_secs(1.5);

        assert_eq!(cache.len("documents"), 1);
        assert_eq!(cache.get("documents", "d1"), None);
        assert_eq!(cache.len("documents"), 0);

        let stats = cache.get_stats();
        assert_eq!(stats.namespaces["documents"].entries, 0);
        assert_eq!(stats.namespaces["documents"].mean_ttl_secs, 0.0);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn test_reads_do_not_extend_ttl() {
        let (clock, cache) = cache();
        cache.set_with_ttl("clients", "c1", json!(1), Duration::from_secs(10));
        for _ in 0..9 {
            clock.advance_secs(1.0);
            assert!(cache.get("clients", "c1").is_some());
        }
        clock.advance_secs(1.5);
        assert!(cache.get("clients", "c1").is_none());
    }

    #[test]
    fn test_delete_and_clear() {
        let (_clock, cache) = cache();
        cache.set("clients", "c1", json!(1));
        cache.set("clients", "c2", json!(2));
        cache.set("templates", "t1", json!(3));

        assert!(cache.delete("clients", "c1"));
        assert!(!cache.delete("clients", "c1"));
        assert!(!cache.delete("missing", "c1"));

        cache.clear(Some("clients"));
        assert_eq!(cache.len("clients"), 0);
        assert_eq!(cache.len("templates"), 1);

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_contains_is_expiry_aware_and_silent() {
        let (clock, cache) = cache();
        cache.set_with_ttl("clients", "c1", json!(1), Duration::from_secs(5));
        assert!(cache.contains("clients", "c1"));
        assert!(cache.predictor().access_history("clients", "c1").is_empty());

        clock.advance_secs(6.0);
        assert!(!cache.contains("clients", "c1"));
        // Peek leaves the entry for the sweep
        assert_eq!(cache.len("clients"), 1);
    }

    #[test]
    fn test_hits_are_reported_to_predictor() {
        let (clock, cache) = cache();
        cache.set("clients", "c1", json!(1));
        cache.get("clients", "c1");
        clock.advance_secs(10.0);
        cache.get("clients", "c1");
        cache.get("clients", "missing");

        assert_eq!(cache.predictor().access_history("clients", "c1").len(), 2);
        assert!(cache.predictor().access_history("clients", "missing").is_empty());
        assert_eq!(
            cache.predictor().predict_access_probability("clients", "c1"),
            1.0
        );
    }

    #[test]
    fn test_cleanup_is_throttled() {
        let config = CacheConfig::default().with_cleanup_interval(Duration::from_secs(60));
        let (clock, cache) = cache_with(config);
        cache.set_with_ttl("documents", "d1", json!(1), Duration::from_secs(1));
        cache.set_with_ttl("documents", "d2", json!(2), Duration::from_secs(100));

        clock.advance_secs(2.0);
        assert_eq!(cache.cleanup(), Some(1));
        cache.set_with_ttl("documents", "d3", json!(3), Duration::from_secs(1));
        clock.advance_secs(30.0);
        assert_eq!(cache.cleanup(), None);
        assert_eq!(cache.len("documents"), 2);

        clock.advance_secs(30.0);
        assert_eq!(cache.cleanup(), Some(1));
        assert_eq!(cache.get_stats().sweeps, 2);
    }

    #[test]
    fn test_stats_aggregate_accesses_and_ttl() {
        let (_clock, cache) = cache();
        cache.set_with_ttl("clients", "c1", json!(1), Duration::from_secs(10));
        cache.set_with_ttl("clients", "c2", json!(2), Duration::from_secs(30));
        cache.get("clients", "c1");
        cache.get("clients", "c1");
        cache.get("clients", "c2");
        cache.get("clients", "nope");

        let stats = cache.get_stats();
        let clients = &stats.namespaces["clients"];
        assert_eq!(clients.entries, 2);
        assert_eq!(clients.total_accesses, 3);
        assert!((clients.mean_ttl_secs - 20.0).abs() < 1e-9);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.predictor.access_records, 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A value is readable up to its TTL and gone strictly after it.
        #[test]
        fn prop_ttl_window(
            ns in arb_namespace(),
            key in arb_key(),
            value in arb_json_value(),
            ttl in arb_ttl_secs(),
        ) {
            let (clock, cache) = cache();
            cache.set_with_ttl(&ns, &key, value.clone(), Duration::from_secs(ttl));

            clock.advance(Duration::from_secs(ttl));
            prop_assert_eq!(cache.get(&ns, &key), Some(value));

            clock.advance(Duration::from_millis(1));
            prop_assert_eq!(cache.get(&ns, &key), None);
            prop_assert_eq!(cache.len(&ns), 0);
        }
    }
}
