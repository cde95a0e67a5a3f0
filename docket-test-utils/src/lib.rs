//! docket Test Utilities
//!
//! Centralized test infrastructure for the docket workspace:
//! - A manually driven clock for deterministic expiry and prediction tests
//! - Fixtures for JSON document trees and model metadata
//! - Proptest generators for cache keys, values and TTLs
//! - Tracing setup that routes logs to the test harness

// Re-export core types for convenience
pub use docket_core::{
    CacheConfig, Clock, DocketError, DocketResult, FileCacheConfig, LoadError, LoaderConfig,
    ModelMetadata, ModelType, PredictiveConfig, PreloadError, SharedClock, Timestamp,
};

use chrono::{TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

// ============================================================================
// CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Start at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at a fixed Monday morning, 2026-01-05 09:00:00 UTC.
    pub fn fixed() -> Arc<Self> {
        let start = Utc
            .with_ymd_and_hms(2026, 1, 5, 9, 0, 0)
            .single()
            .expect("valid fixed timestamp");
        Arc::new(Self::new(start))
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).expect("duration in range");
    }

    /// Move time forward by fractional seconds.
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

/// Upcast a manual clock to the shared trait object the components take.
pub fn shared(clock: &Arc<ManualClock>) -> SharedClock {
    clock.clone()
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Write `value` as pretty JSON to `dir/name`, returning the path.
pub fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

/// A document record as the host application stores it.
pub fn sample_document(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": format!("Document {id}"),
        "template_id": "tpl-invoice",
        "fields": {"client_name": "Acme GmbH", "amount": "1200.00"},
    })
}

/// `count` metadata records with ids `{prefix}{i}`.
pub fn sample_metadata(model_type: ModelType, prefix: &str, count: usize) -> Vec<ModelMetadata> {
    let created = Utc
        .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    (0..count)
        .map(|i| {
            ModelMetadata::new(
                model_type,
                format!("{prefix}{i}"),
                format!("{} {i}", model_type.as_str().to_lowercase()),
                format!("summary of {prefix}{i}"),
                created,
            )
        })
        .collect()
}

/// Backdate the on-disk access time of `path` by `age`.
pub fn set_accessed_ago(path: &Path, age: Duration) {
    let accessed = SystemTime::now() - age;
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_times(fs::FileTimes::new().set_accessed(accessed))
        .unwrap();
}

/// Shared call counter for closures handed to caches under test.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call.
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Calls recorded so far.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Route `tracing` output to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Proptest strategies for cache inputs.
pub mod generators {
    use proptest::prelude::*;

    /// Namespace names as the host application uses them.
    pub fn arb_namespace() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("clients".to_string()),
            Just("templates".to_string()),
            Just("documents".to_string()),
            "[a-z]{3,12}",
        ]
    }

    /// Record keys.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z0-9_-]{1,24}"
    }

    /// Small JSON payloads.
    pub fn arb_json_value() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            any::<i64>().prop_map(serde_json::Value::from),
            "[ -~]{0,32}".prop_map(serde_json::Value::from),
            ("[a-z]{1,8}", "[ -~]{0,16}")
                .prop_map(|(k, v)| serde_json::json!({ k: v })),
        ]
    }

    /// TTLs between one second and one day, in seconds.
    pub fn arb_ttl_secs() -> impl Strategy<Value = u64> {
        1u64..86_400
    }
}
