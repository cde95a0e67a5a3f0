//! Cache Context
//!
//! Owns one instance of every cache component and wires them together: the
//! TTL cache reports hits to the predictor, predicted entities are loaded
//! through the lazy loader into the TTL cache, and periodic maintenance is
//! handed to the [`Scheduler`].

use crate::file_cache::{FileCacheStats, FileContentCache};
use crate::lazy_loader::{LazyModelLoader, LoaderStats};
use crate::predictor::AccessPredictor;
use crate::scheduler::{PeriodicTask, Scheduler};
use crate::ttl_cache::{TtlCache, TtlCacheStats};
use docket_core::constants::{CACHE_CONFIG_FILE, PREDICTIVE_CONFIG_FILE};
use docket_core::{
    CacheConfig, JsonConfig, ModelType, PredictiveConfig, PreloadError, SharedClock,
};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Model payload cached by the context.
pub type Record = serde_json::Value;

/// Combined snapshot of every component.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheContextStats {
    pub ttl: TtlCacheStats,
    pub loader: LoaderStats,
    pub files: FileCacheStats,
}

/// The caching engine for one process.
#[derive(Debug, Clone)]
pub struct CacheContext {
    clock: SharedClock,
    predictor: Arc<AccessPredictor>,
    ttl_cache: Arc<TtlCache<Record>>,
    file_cache: Arc<FileContentCache>,
    loader: Arc<LazyModelLoader<Record>>,
}

impl CacheContext {
    /// Build every component from explicit configuration.
    pub fn new(cache_config: CacheConfig, predictive_config: PredictiveConfig, clock: SharedClock) -> Self {
        let predictor = Arc::new(AccessPredictor::new(predictive_config, clock.clone()));
        let file_cache = Arc::new(FileContentCache::new(
            cache_config.file_cache.clone(),
            clock.clone(),
        ));
        let loader = Arc::new(LazyModelLoader::new(
            cache_config.lazy_loader.clone(),
            clock.clone(),
        ));
        let ttl_cache = Arc::new(TtlCache::new(cache_config, predictor.clone(), clock.clone()));

        Self {
            clock,
            predictor,
            ttl_cache,
            file_cache,
            loader,
        }
    }

    /// Build from `cache_config.json` and `predictive_config.json` in `dir`.
    ///
    /// Missing or invalid files fall back to defaults.
    pub fn from_config_dir(dir: &Path, clock: SharedClock) -> Self {
        let cache_config = CacheConfig::load_or_default(&dir.join(CACHE_CONFIG_FILE));
        let predictive_config = PredictiveConfig::load_or_default(&dir.join(PREDICTIVE_CONFIG_FILE));
        tracing::info!(
            dir = %dir.display(),
            namespaces = cache_config.cache_types.len(),
            "Cache context configured"
        );
        Self::new(cache_config, predictive_config, clock)
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn predictor(&self) -> &Arc<AccessPredictor> {
        &self.predictor
    }

    pub fn ttl_cache(&self) -> &Arc<TtlCache<Record>> {
        &self.ttl_cache
    }

    pub fn file_cache(&self) -> &Arc<FileContentCache> {
        &self.file_cache
    }

    pub fn loader(&self) -> &Arc<LazyModelLoader<Record>> {
        &self.loader
    }

    /// Report a view change from the UI.
    pub fn record_navigation(&self, view: &str) {
        self.predictor.record_navigation(view);
    }

    /// Forget every cached copy of one domain record.
    pub fn invalidate_record(&self, model_type: ModelType, id: &str) {
        let removed = self.ttl_cache.delete(model_type.namespace(), id);
        self.loader.invalidate(model_type, id);
        tracing::debug!(model_type = %model_type, id, removed, "Invalidated record");
    }

    /// Let the predictor warm `model_type` records: a predicted id is loaded
    /// through the lazy loader and stored in the TTL cache under the type's
    /// namespace.
    pub fn wire_model_preloading(&self, model_type: ModelType) {
        let loader: Weak<LazyModelLoader<Record>> = Arc::downgrade(&self.loader);
        let ttl_cache: Weak<TtlCache<Record>> = Arc::downgrade(&self.ttl_cache);
        let namespace = model_type.namespace();

        self.predictor.register_preloader(
            namespace,
            Arc::new(move |id: &str| -> Result<(), PreloadError> {
                let failed = |reason: &str| PreloadError::Failed {
                    target: format!("{namespace}/{id}"),
                    reason: reason.to_string(),
                };
                let (Some(loader), Some(ttl_cache)) = (loader.upgrade(), ttl_cache.upgrade()) else {
                    return Err(failed("cache context dropped"));
                };
                let model = loader
                    .get_model(model_type, id)
                    .ok_or_else(|| failed("record not available"))?;
                ttl_cache.set(namespace, id, model);
                Ok(())
            }),
        );
    }

    /// Register TTL sweeps, predictive preloading and file cache sweeps.
    pub fn register_periodic_tasks(&self, scheduler: &mut Scheduler) {
        let ttl_cache = self.ttl_cache.clone();
        scheduler.register(PeriodicTask::new(
            "ttl_cleanup",
            ttl_cache.config().cleanup_interval,
            move || {
                ttl_cache.cleanup();
            },
        ));

        let predictor = self.predictor.clone();
        scheduler.register(PeriodicTask::new(
            "predictive_preload",
            predictor.config().cache_warmup_interval,
            move || {
                predictor.preload();
            },
        ));

        let file_cache = self.file_cache.clone();
        scheduler.register(PeriodicTask::new(
            "file_cache_sweep",
            file_cache.config().sweep_interval,
            move || {
                file_cache.sweep();
            },
        ));
    }

    pub fn stats(&self) -> CacheContextStats {
        CacheContextStats {
            ttl: self.ttl_cache.get_stats(),
            loader: self.loader.get_stats(),
            files: self.file_cache.get_stats(),
        }
    }
}
