//! docket Core - Shared Types
//!
//! Data types, configuration, time source and error taxonomy for the docket
//! caching engine. The cache crate and the host application both depend on
//! this; it contains no caching logic of its own.

pub mod clock;
pub mod config;
pub mod constants;
pub mod entities;
pub mod error;

use chrono::{DateTime, Utc};

pub use clock::{elapsed_between, Clock, SharedClock, SystemClock};
pub use config::{
    default_navigation_patterns, CacheConfig, FileCacheConfig, JsonConfig, LoaderConfig,
    NamespaceConfig, PerformanceSettings, PredictiveConfig,
};
pub use entities::{ModelMetadata, ModelType};
pub use error::{
    ConfigError, DocketError, DocketResult, FileCacheError, LoadError, PreloadError,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
