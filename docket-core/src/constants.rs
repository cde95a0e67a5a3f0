//! Default values for the docket caching engine.
//!
//! Every knob a config file can override has its fallback here, so the
//! documented defaults live in exactly one place.

// ============================================================================
// TTL CACHE
// ============================================================================

/// TTL applied to namespaces without a configured entry (1 hour)
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Minimum time between two expiry sweeps of the TTL cache (1 hour)
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// File name of the TTL cache configuration
pub const CACHE_CONFIG_FILE: &str = "cache_config.json";

// ============================================================================
// ACCESS PREDICTOR
// ============================================================================

/// Maximum access records kept per entity type, and navigation records overall
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 50;

/// Probability an entity must exceed to be preloaded
pub const DEFAULT_PREDICTION_THRESHOLD: f64 = 0.85;

/// Minimum time between two preload runs (10 minutes)
pub const DEFAULT_CACHE_WARMUP_INTERVAL_SECS: u64 = 600;

/// Minimum time between two history trimming passes (1 hour)
pub const DEFAULT_HISTORY_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Access records older than this are dropped by trimming (12 hours)
pub const DEFAULT_HISTORY_RETENTION_SECS: u64 = 12 * 3600;

/// Preload actions dispatched per run
pub const DEFAULT_MAX_CONCURRENT_PRELOADS: usize = 1;

/// Lower bound for the mean inter-access interval, in milliseconds
pub const MIN_ACCESS_INTERVAL_MS: i64 = 1;

/// File name of the predictor configuration
pub const PREDICTIVE_CONFIG_FILE: &str = "predictive_config.json";

// ============================================================================
// LAZY MODEL LOADER
// ============================================================================

/// Full objects cached per model type
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Metadata records indexed per model type
pub const DEFAULT_MAX_METADATA_SIZE: usize = 10_000;

// ============================================================================
// FILE CONTENT CACHE
// ============================================================================

/// Parsed files kept in memory
pub const DEFAULT_FILE_CACHE_MAX_ENTRIES: usize = 100;

/// Hard ceiling on the estimated in-memory footprint (512 MB)
pub const DEFAULT_MEMORY_CEILING_BYTES: u64 = 512 * 1024 * 1024;

/// Interval of the background sweep (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Recent access timestamps kept per path
pub const DEFAULT_ACCESS_WINDOW: usize = 10;

/// Files not accessed for this long are compressed by compaction (24 hours)
pub const DEFAULT_COMPACTION_AGE_SECS: u64 = 24 * 3600;

/// Extension appended to compressed siblings
pub const GZIP_EXTENSION: &str = "gz";

// ============================================================================
// SCHEDULER
// ============================================================================

/// Shortest tick the shared scheduler will use, in milliseconds
pub const MIN_SCHEDULER_TICK_MS: u64 = 10;
