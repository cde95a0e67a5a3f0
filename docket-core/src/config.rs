//! Configuration types
//!
//! Two JSON files configure the engine: `cache_config.json` (TTL cache, file
//! cache, lazy loader) and `predictive_config.json` (access predictor). Both
//! are optional. A missing, unreadable, malformed or invalid file yields the
//! documented defaults and a log line, never an error.

use crate::constants::*;
use crate::{ConfigError, DocketError, DocketResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// (De)serialize a `Duration` as a number of seconds (fractions allowed).
pub mod duration_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("duration of {secs} seconds: {e}")))
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> DocketError {
    DocketError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// LOADING
// ============================================================================

/// A configuration document stored as JSON.
pub trait JsonConfig: DeserializeOwned + Default {
    /// Check cross-field constraints after parsing.
    fn validate(&self) -> DocketResult<()>;

    /// Read and parse `path` without falling back.
    fn read_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read `path`, substituting defaults for anything that goes wrong.
    fn load_or_default(path: &Path) -> Self {
        let config = match Self::read_from(path) {
            Ok(config) => config,
            Err(ConfigError::Unreadable { .. }) if !path.exists() => {
                tracing::info!(path = %path.display(), "Config file absent, using defaults");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                return Self::default();
            }
        };

        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Config failed validation, using defaults"
                );
                Self::default()
            }
        }
    }
}

// ============================================================================
// cache_config.json
// ============================================================================

/// Per-namespace options of the TTL cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

/// Options of the file content cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCacheConfig {
    pub max_entries: usize,
    pub memory_ceiling_bytes: u64,
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
    /// Recent access timestamps kept per path.
    pub access_window: usize,
    #[serde(with = "duration_secs")]
    pub compaction_age: Duration,
    /// Probability above which a path counts as "likely reaccessed".
    pub prediction_threshold: f64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_FILE_CACHE_MAX_ENTRIES,
            memory_ceiling_bytes: DEFAULT_MEMORY_CEILING_BYTES,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            access_window: DEFAULT_ACCESS_WINDOW,
            compaction_age: Duration::from_secs(DEFAULT_COMPACTION_AGE_SECS),
            prediction_threshold: DEFAULT_PREDICTION_THRESHOLD,
        }
    }
}

/// Options of the two-tier lazy model loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub max_cache_size: usize,
    pub max_metadata_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_metadata_size: DEFAULT_MAX_METADATA_SIZE,
        }
    }
}

/// Contents of `cache_config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
    pub cache_types: BTreeMap<String, NamespaceConfig>,
    pub file_cache: FileCacheConfig,
    pub lazy_loader: LoaderConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            cache_types: BTreeMap::new(),
            file_cache: FileCacheConfig::default(),
            lazy_loader: LoaderConfig::default(),
        }
    }
}

impl CacheConfig {
    /// TTL for `namespace`, falling back to the hard-coded default.
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.cache_types
            .get(namespace)
            .map(|ns| ns.ttl)
            .unwrap_or(Duration::from_secs(DEFAULT_TTL_SECS))
    }

    /// Set the TTL of one namespace.
    pub fn with_namespace_ttl(mut self, namespace: impl Into<String>, ttl: Duration) -> Self {
        self.cache_types
            .insert(namespace.into(), NamespaceConfig { ttl });
        self
    }

    /// Set the cleanup throttle interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

impl JsonConfig for CacheConfig {
    fn validate(&self) -> DocketResult<()> {
        for (name, ns) in &self.cache_types {
            if ns.ttl.is_zero() {
                return Err(invalid(
                    &format!("cache_types.{name}.ttl"),
                    format!("{:?}", ns.ttl),
                    "ttl must be positive",
                ));
            }
        }

        let fc = &self.file_cache;
        if fc.max_entries == 0 {
            return Err(invalid(
                "file_cache.max_entries",
                fc.max_entries,
                "max_entries must be greater than 0",
            ));
        }
        if fc.memory_ceiling_bytes == 0 {
            return Err(invalid(
                "file_cache.memory_ceiling_bytes",
                fc.memory_ceiling_bytes,
                "memory_ceiling_bytes must be greater than 0",
            ));
        }
        if fc.access_window < 2 {
            return Err(invalid(
                "file_cache.access_window",
                fc.access_window,
                "access_window must hold at least 2 timestamps",
            ));
        }
        if !(0.0..=1.0).contains(&fc.prediction_threshold) {
            return Err(invalid(
                "file_cache.prediction_threshold",
                fc.prediction_threshold,
                "prediction_threshold must be between 0.0 and 1.0",
            ));
        }

        if self.lazy_loader.max_cache_size == 0 {
            return Err(invalid(
                "lazy_loader.max_cache_size",
                self.lazy_loader.max_cache_size,
                "max_cache_size must be greater than 0",
            ));
        }
        if self.lazy_loader.max_metadata_size == 0 {
            return Err(invalid(
                "lazy_loader.max_metadata_size",
                self.lazy_loader.max_metadata_size,
                "max_metadata_size must be greater than 0",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// predictive_config.json
// ============================================================================

/// Resource limits for speculative work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Preload actions dispatched per run. Zero disables preloading.
    pub max_concurrent_preloads: usize,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_concurrent_preloads: DEFAULT_MAX_CONCURRENT_PRELOADS,
        }
    }
}

/// Contents of `predictive_config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictiveConfig {
    pub max_history_size: usize,
    pub prediction_threshold: f64,
    /// Minimum time between history trimming passes.
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
    /// Minimum time between preload runs.
    #[serde(with = "duration_secs")]
    pub cache_warmup_interval: Duration,
    #[serde(with = "duration_secs")]
    pub history_retention: Duration,
    /// Static adjacency map: view -> views usually opened next.
    pub navigation_patterns: BTreeMap<String, Vec<String>>,
    pub performance_settings: PerformanceSettings,
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            prediction_threshold: DEFAULT_PREDICTION_THRESHOLD,
            cleanup_interval: Duration::from_secs(DEFAULT_HISTORY_CLEANUP_INTERVAL_SECS),
            cache_warmup_interval: Duration::from_secs(DEFAULT_CACHE_WARMUP_INTERVAL_SECS),
            history_retention: Duration::from_secs(DEFAULT_HISTORY_RETENTION_SECS),
            navigation_patterns: default_navigation_patterns(),
            performance_settings: PerformanceSettings::default(),
        }
    }
}

/// Navigation map of the desktop application's main views.
pub fn default_navigation_patterns() -> BTreeMap<String, Vec<String>> {
    let pattern = |from: &str, to: &[&str]| {
        (
            from.to_string(),
            to.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
        )
    };
    BTreeMap::from([
        pattern("dashboard", &["clients", "documents", "templates"]),
        pattern("clients", &["client_detail", "documents"]),
        pattern("documents", &["document_detail", "templates"]),
        pattern("templates", &["template_editor"]),
    ])
}

impl JsonConfig for PredictiveConfig {
    fn validate(&self) -> DocketResult<()> {
        if self.max_history_size < 2 {
            return Err(invalid(
                "max_history_size",
                self.max_history_size,
                "max_history_size must keep at least 2 records",
            ));
        }
        if !(0.0..=1.0).contains(&self.prediction_threshold) {
            return Err(invalid(
                "prediction_threshold",
                self.prediction_threshold,
                "prediction_threshold must be between 0.0 and 1.0",
            ));
        }
        if self.history_retention.is_zero() {
            return Err(invalid(
                "history_retention",
                format!("{:?}", self.history_retention),
                "history_retention must be positive",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
