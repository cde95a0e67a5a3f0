//! File content cache.
//!
//! Caches parsed JSON documents by path, keeps a short window of recent
//! accesses per path, and evicts by a priority score built on the same
//! reaccess heuristic the predictor uses.
//!
//! # Locking
//!
//! Every operation that touches a path takes that path's lock first and the
//! entry map lock second. The sweep follows the same order when it removes
//! victims, so a sweep never drops an entry a reader is in the middle of
//! populating.
//!
//! Entries and path locks are keyed by the logical path (any `.gz` suffix
//! dropped) with its directory canonicalized, so `data/x.json`,
//! `./data/x.json` and `data/x.json.gz` all name one entry and one lock.

pub mod compaction;
pub mod io;

pub use compaction::CompactionReport;
pub use io::{gz_sibling, stage_write, StagedWrite};

use crate::predictor::access_probability;
use docket_core::{elapsed_between, DocketResult, FileCacheConfig, SharedClock, Timestamp};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct FileEntry {
    content: serde_json::Value,
    last_access: Timestamp,
    recent_accesses: VecDeque<Timestamp>,
    size_bytes: u64,
}

impl FileEntry {
    fn new(content: serde_json::Value, now: Timestamp) -> Self {
        let size_bytes = estimate_size(&content);
        Self {
            content,
            last_access: now,
            recent_accesses: VecDeque::from([now]),
            size_bytes,
        }
    }

    fn record_access(&mut self, now: Timestamp, window: usize) {
        self.last_access = now;
        self.recent_accesses.push_back(now);
        while self.recent_accesses.len() > window {
            self.recent_accesses.pop_front();
        }
    }
}

fn estimate_size(content: &serde_json::Value) -> u64 {
    serde_json::to_vec(content).map_or(0, |bytes| bytes.len() as u64)
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub entries_before: usize,
    pub bytes_before: u64,
    pub evicted: usize,
    /// True when the memory ceiling forced dropping half the cache.
    pub memory_pressure: bool,
}

/// Snapshot of file cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCacheStats {
    pub entries: usize,
    pub estimated_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub sweeps: u64,
    pub compactions: u64,
}

/// Parsed-content cache over JSON files with adaptive eviction.
#[derive(Debug)]
pub struct FileContentCache {
    entries: Mutex<HashMap<PathBuf, FileEntry>>,
    path_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    config: FileCacheConfig,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    sweeps: AtomicU64,
    compactions: AtomicU64,
}

/// Entry and lock key for a logical path.
fn cache_key(logical: &Path) -> PathBuf {
    let parent = match logical.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), logical.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => logical.to_path_buf(),
    }
}

fn recover<'a, T>(result: std::sync::LockResult<MutexGuard<'a, T>>, what: &str) -> MutexGuard<'a, T> {
    result.unwrap_or_else(|poisoned| {
        tracing::warn!(lock = what, "File cache lock poisoned, recovering");
        poisoned.into_inner()
    })
}

impl FileContentCache {
    pub fn new(config: FileCacheConfig, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            path_locks: Mutex::new(HashMap::new()),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &FileCacheConfig {
        &self.config
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, FileEntry>> {
        recover(self.entries.lock(), "entries")
    }

    fn path_lock(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut locks = recover(self.path_locks.lock(), "path_locks");
        locks.entry(key.to_path_buf()).or_default().clone()
    }

    // ========================================================================
    // READ / WRITE
    // ========================================================================

    /// Parsed contents of `path`, from memory when cached.
    ///
    /// On a miss the file is read (plain, or its `.gz` sibling) and cached if
    /// there is room. Errors leave the cache unchanged.
    pub fn read(&self, path: &Path) -> DocketResult<serde_json::Value> {
        let logical = io::logical_path(path);
        let key = cache_key(&logical);
        let lock = self.path_lock(&key);
        let _io = recover(lock.lock(), "path");
        let now = self.clock.now();

        {
            let mut entries = self.entries();
            if let Some(entry) = entries.get_mut(&key) {
                entry.record_access(now, self.config.access_window);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.content.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let content = io::read_json(&logical)?;

        let mut entries = self.entries();
        if entries.len() < self.config.max_entries {
            entries.insert(key, FileEntry::new(content.clone(), now));
            tracing::debug!(path = %path.display(), "Cached file content");
        } else {
            tracing::debug!(path = %path.display(), "File cache full, not caching");
        }
        Ok(content)
    }

    /// Atomically write `data` to `path` (or `path.gz` with `compress`) and
    /// refresh the cached entry.
    pub fn write(&self, path: &Path, data: &serde_json::Value, compress: bool) -> DocketResult<()> {
        let logical = io::logical_path(path);
        let key = cache_key(&logical);
        let lock = self.path_lock(&key);
        let _io = recover(lock.lock(), "path");

        let written = io::write_json_atomic(&logical, data, compress)?;
        tracing::debug!(path = %written.display(), compress, "Wrote file");

        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.content = data.clone();
                entry.size_bytes = estimate_size(data);
                entry.record_access(now, self.config.access_window);
            }
            None => {
                entries.insert(key, FileEntry::new(data.clone(), now));
            }
        }
        Ok(())
    }

    /// Drop the cached entry for `path`; true if one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        let key = cache_key(&io::logical_path(path));
        let lock = self.path_lock(&key);
        let _io = recover(lock.lock(), "path");
        let removed = self.entries().remove(&key).is_some();
        removed
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        let key = cache_key(&io::logical_path(path));
        self.entries().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    // ========================================================================
    // EVICTION
    // ========================================================================

    fn priority(&self, entry: &FileEntry, now: Timestamp) -> f64 {
        let history: Vec<Timestamp> = entry.recent_accesses.iter().copied().collect();
        let predicted = if access_probability(&history, now) > self.config.prediction_threshold {
            2.0
        } else {
            0.0
        };
        let idle = elapsed_between(entry.last_access, now).as_secs_f64();
        1.0 + predicted + 1.0 / (idle + 1.0)
    }

    /// Evict low-priority entries when over `max_entries` or the memory
    /// ceiling.
    ///
    /// Over the entry limit, the lowest-priority entries are removed down to
    /// the limit. Over the memory ceiling, at least half the cache is
    /// removed, lowest priority first.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        let (mut report, victims) = {
            let entries = self.entries();
            let count = entries.len();
            let bytes: u64 = entries.values().map(|e| e.size_bytes).sum();
            let mut report = SweepReport {
                entries_before: count,
                bytes_before: bytes,
                ..Default::default()
            };

            let excess = count.saturating_sub(self.config.max_entries);
            report.memory_pressure = bytes > self.config.memory_ceiling_bytes;
            let to_drop = if report.memory_pressure {
                excess.max(count.div_ceil(2))
            } else {
                excess
            };
            if to_drop == 0 {
                return report;
            }

            let mut scored: Vec<(f64, &PathBuf)> = entries
                .iter()
                .map(|(path, entry)| (self.priority(entry, now), path))
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));

            let victims: Vec<PathBuf> = scored
                .into_iter()
                .take(to_drop)
                .map(|(_, path)| path.clone())
                .collect();
            (report, victims)
        };

        for path in &victims {
            let lock = self.path_lock(path);
            let _io = recover(lock.lock(), "path");
            if self.entries().remove(path).is_some() {
                report.evicted += 1;
            }
        }
        self.evictions.fetch_add(report.evicted as u64, Ordering::Relaxed);
        self.prune_path_locks();

        tracing::info!(
            before = report.entries_before,
            evicted = report.evicted,
            memory_pressure = report.memory_pressure,
            "File cache sweep"
        );
        report
    }

    fn prune_path_locks(&self) {
        let mut locks = recover(self.path_locks.lock(), "path_locks");
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    // ========================================================================
    // COMPACTION
    // ========================================================================

    /// Gzip every `*.json` under `dir` not accessed within `compaction_age`.
    ///
    /// Each plaintext file is replaced by its `.gz` sibling under that path's
    /// lock. Cached entries stay valid since reads resolve either form.
    pub fn optimize_directory(&self, dir: &Path) -> DocketResult<CompactionReport> {
        let (scanned, cold, mut errors) = compaction::find_cold_files(dir, self.config.compaction_age)?;

        let mut compressed = Vec::with_capacity(cold.len());
        for path in cold {
            let lock = self.path_lock(&cache_key(&path));
            let _io = recover(lock.lock(), "path");
            match io::compress_in_place(&path) {
                Ok(_) => compressed.push(path),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Compaction failed");
                    errors += 1;
                }
            }
        }
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.prune_path_locks();

        tracing::info!(
            dir = %dir.display(),
            scanned,
            compressed = compressed.len(),
            errors,
            "Directory compaction"
        );
        Ok(CompactionReport {
            scanned,
            compressed,
            errors,
        })
    }

    pub fn get_stats(&self) -> FileCacheStats {
        let (entries, estimated_bytes) = {
            let entries = self.entries();
            (entries.len(), entries.values().map(|e| e.size_bytes).sum())
        };
        FileCacheStats {
            entries,
            estimated_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::{DocketError, FileCacheError};
    use docket_test_utils::{sample_document, shared, write_json, ManualClock};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cache_with(config: FileCacheConfig) -> (Arc<ManualClock>, FileContentCache) {
        let clock = ManualClock::fixed();
        let cache = FileContentCache::new(config, shared(&clock));
        (clock, cache)
    }

    fn cache() -> (Arc<ManualClock>, FileContentCache) {
        cache_with(FileCacheConfig::default())
    }

    #[test]
    fn test_read_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let path = write_json(dir.path(), "d1.json", &sample_document("d1"));
        let (_clock, cache) = cache();

        assert_eq!(cache.read(&path).unwrap(), sample_document("d1"));
        // Served from memory even after the file is gone
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.read(&path).unwrap(), sample_document("d1"));

        let stats = cache.get_stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert!(stats.estimated_bytes > 0);
    }

    #[test]
    fn test_read_error_leaves_cache_unchanged() {
        let dir = TempDir::new().unwrap();
        let (_clock, cache) = cache();
        let missing = dir.path().join("missing.json");

        let err = cache.read(&missing).unwrap_err();
        assert_eq!(
            err,
            DocketError::FileCache(FileCacheError::NotFound { path: missing })
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_read_falls_back_to_gz_sibling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t1.json");
        io::write_json_atomic(&path, &json!({"id": "t1"}), true).unwrap();
        let (_clock, cache) = cache();

        assert_eq!(cache.read(&path).unwrap(), json!({"id": "t1"}));
        assert_eq!(cache.read(&gz_sibling(&path)).unwrap(), json!({"id": "t1"}));
    }

    #[test]
    fn test_full_cache_still_serves_reads() {
        let dir = TempDir::new().unwrap();
        let config = FileCacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let (_clock, cache) = cache_with(config);
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| write_json(dir.path(), &format!("d{i}.json"), &json!(i)))
            .collect();

        for (i, path) in paths.iter().enumerate() {
            assert_eq!(cache.read(path).unwrap(), json!(i));
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&paths[2]));
    }

    #[test]
    fn test_write_refreshes_entry() {
        let dir = TempDir::new().unwrap();
        let path = write_json(dir.path(), "c1.json", &json!({"v": 1}));
        let (_clock, cache) = cache();

        cache.read(&path).unwrap();
        cache.write(&path, &json!({"v": 2}), false).unwrap();
        assert_eq!(cache.read(&path).unwrap(), json!({"v": 2}));
        assert_eq!(io::read_json(&path).unwrap(), json!({"v": 2}));
    }

    #[test]
    fn test_write_inserts_even_when_full() {
        let dir = TempDir::new().unwrap();
        let config = FileCacheConfig {
            max_entries: 1,
            ..Default::default()
        };
        let (_clock, cache) = cache_with(config);
        let a = write_json(dir.path(), "a.json", &json!("a"));
        cache.read(&a).unwrap();

        let b = dir.path().join("b.json");
        cache.write(&b, &json!("b"), true).unwrap();
        assert!(cache.contains(&b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_write_keeps_old_entry() {
        let dir = TempDir::new().unwrap();
        let (_clock, cache) = cache();
        let path = dir.path().join("missing_dir").join("c1.json");

        assert!(cache.write(&path, &json!(1), false).is_err());
        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_sweep_below_limits_is_noop() {
        let dir = TempDir::new().unwrap();
        let (_clock, cache) = cache();
        let path = write_json(dir.path(), "a.json", &json!(1));
        cache.read(&path).unwrap();

        let report = cache.sweep();
        assert_eq!(report.evicted, 0);
        assert!(!report.memory_pressure);
        assert_eq!(cache.get_stats().sweeps, 1);
    }

    #[test]
    fn test_sweep_keeps_frequently_read_entries() {
        let dir = TempDir::new().unwrap();
        let config = FileCacheConfig {
            max_entries: 1,
            ..Default::default()
        };
        let (clock, cache) = cache_with(config);
        let hot = dir.path().join("hot.json");
        let cold = dir.path().join("cold.json");
        let warm = dir.path().join("warm.json");

        // Writes populate past max_entries; reads would not
        cache.write(&cold, &json!("cold"), false).unwrap();
        cache.write(&hot, &json!("hot"), false).unwrap();
        for _ in 0..3 {
            clock.advance(Duration::from_secs(5));
            cache.read(&hot).unwrap();
        }
        clock.advance(Duration::from_secs(5));
        cache.write(&warm, &json!("warm"), false).unwrap();
        clock.advance(Duration::from_secs(1));

        let report = cache.sweep();
        assert_eq!(report.entries_before, 3);
        assert_eq!(report.evicted, 2);
        assert!(cache.contains(&hot));
        assert_eq!(cache.get_stats().evictions, 2);
    }

    #[test]
    fn test_memory_ceiling_drops_half() {
        let dir = TempDir::new().unwrap();
        let config = FileCacheConfig {
            memory_ceiling_bytes: 1,
            ..Default::default()
        };
        let (clock, cache) = cache_with(config);
        for i in 0..4 {
            let path = write_json(dir.path(), &format!("d{i}.json"), &sample_document(&i.to_string()));
            cache.read(&path).unwrap();
            clock.advance(Duration::from_secs(60));
        }

        let report = cache.sweep();
        assert!(report.memory_pressure);
        assert_eq!(report.evicted, 2);
        assert_eq!(cache.len(), 2);
        // Most recently read survive
        assert!(cache.contains(&dir.path().join("d3.json")));
        assert!(cache.contains(&dir.path().join("d2.json")));
    }

    #[test]
    fn test_gz_and_plain_names_share_an_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1.json");
        let packed = gz_sibling(&path);
        let (_clock, cache) = cache();

        cache.write(&path, &json!({"v": 1}), true).unwrap();
        assert_eq!(cache.read(&packed).unwrap(), json!({"v": 1}));
        cache.write(&path, &json!({"v": 2}), true).unwrap();
        assert_eq!(cache.read(&packed).unwrap(), json!({"v": 2}));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(&packed));
        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_dotted_path_forms_share_a_key() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("clients")).unwrap();
        let direct = dir.path().join("clients").join("c1.json");
        let dotted = dir.path().join(".").join("clients").join("..").join("clients").join("c1.json");
        assert_eq!(cache_key(&direct), cache_key(&dotted));

        let (_clock, cache) = cache();
        cache.write(&direct, &json!(1), false).unwrap();
        cache.write(&dotted, &json!(2), false).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.read(&direct).unwrap(), json!(2));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = TempDir::new().unwrap();
        let (_clock, cache) = cache();
        let a = write_json(dir.path(), "a.json", &json!(1));
        let b = write_json(dir.path(), "b.json", &json!(2));
        cache.read(&a).unwrap();
        cache.read(&b).unwrap();

        assert!(cache.invalidate(&a));
        assert!(!cache.invalidate(&a));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
