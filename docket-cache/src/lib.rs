//! docket Cache - Adaptive Caching and Predictive Prefetch
//!
//! Single-process acceleration layer for the docket document tool.
//! The store of record stays on disk; everything here holds derived copies.
//!
//! - [`TtlCache`]: namespaced key/value cache with per-namespace TTLs
//! - [`AccessPredictor`]: access histories, reaccess probabilities and
//!   bounded speculative preloading
//! - [`LazyModelLoader`]: metadata index plus capacity-bounded full-model cache
//! - [`FileContentCache`]: parsed JSON file cache with atomic writes, gzip
//!   siblings and cold-file compaction
//! - [`Scheduler`]: one tokio ticker for all periodic maintenance
//! - [`CacheContext`]: owns and wires the above

pub mod context;
pub mod entry;
pub mod file_cache;
pub mod lazy_loader;
pub mod predictor;
pub mod scheduler;
pub mod ttl_cache;

pub use context::{CacheContext, CacheContextStats, Record};
pub use entry::CacheEntry;
pub use file_cache::{
    gz_sibling, stage_write, CompactionReport, FileCacheStats, FileContentCache, StagedWrite,
    SweepReport,
};
pub use lazy_loader::{FnSource, LazyModelLoader, LoaderStats, ModelSource, TypeStats};
pub use predictor::{
    access_probability, AccessPredictor, AccessRecord, NavigationRecord, PredictorStats,
    PreloadReport, PreloadTarget, Preloader,
};
pub use scheduler::{PeriodicTask, Scheduler, SchedulerHandle, SchedulerReport};
pub use ttl_cache::{NamespaceStats, TtlCache, TtlCacheStats};
