//! Two-tier lazy model loader.
//!
//! Each [`ModelType`] gets a cheap metadata index and a capacity-bounded
//! cache of fully materialized models. Both are populated on demand through
//! a [`ModelSource`] registered by the persistence layer.
//!
//! Each type has its own mutex; sources are always called without it held.
//! Source errors are logged and turned into absent or empty results, so a
//! caller of the loader never sees a [`LoadError`].
//!
//! Every invalidation bumps the type's generation. A load that finishes
//! after the generation moved returns its result without caching it, so an
//! invalidation racing a load is never undone.

use docket_core::{LoadError, LoaderConfig, ModelMetadata, ModelType, SharedClock, Timestamp};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Persistence callbacks for one model type.
pub trait ModelSource<M>: Send + Sync {
    /// Load one full model; `Ok(None)` when the id does not exist.
    fn load_by_id(&self, id: &str) -> Result<Option<M>, LoadError>;

    /// Summarize every stored model of this type.
    fn load_all_metadata(&self) -> Result<Vec<ModelMetadata>, LoadError>;
}

/// [`ModelSource`] built from a pair of closures.
pub struct FnSource<L, A> {
    load_by_id: L,
    load_all_metadata: A,
}

impl<L, A> FnSource<L, A> {
    pub fn new(load_by_id: L, load_all_metadata: A) -> Self {
        Self {
            load_by_id,
            load_all_metadata,
        }
    }
}

impl<M, L, A> ModelSource<M> for FnSource<L, A>
where
    L: Fn(&str) -> Result<Option<M>, LoadError> + Send + Sync,
    A: Fn() -> Result<Vec<ModelMetadata>, LoadError> + Send + Sync,
{
    fn load_by_id(&self, id: &str) -> Result<Option<M>, LoadError> {
        (self.load_by_id)(id)
    }

    fn load_all_metadata(&self) -> Result<Vec<ModelMetadata>, LoadError> {
        (self.load_all_metadata)()
    }
}

/// Per-type snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub metadata_entries: usize,
    pub full_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub load_failures: u64,
    pub evictions: u64,
}

/// Snapshot of every type the loader has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub types: BTreeMap<ModelType, TypeStats>,
    pub max_cache_size: usize,
    pub max_metadata_size: usize,
}

#[derive(Debug, Clone)]
struct CachedModel<M> {
    data: M,
    last_accessed: Timestamp,
    access_seq: u64,
}

struct TypeTiers<M> {
    source: Option<Arc<dyn ModelSource<M>>>,
    metadata: HashMap<String, ModelMetadata>,
    full: HashMap<String, CachedModel<M>>,
    generation: u64,
    hits: u64,
    misses: u64,
    load_failures: u64,
    evictions: u64,
}

impl<M> Default for TypeTiers<M> {
    fn default() -> Self {
        Self {
            source: None,
            metadata: HashMap::new(),
            full: HashMap::new(),
            generation: 0,
            hits: 0,
            misses: 0,
            load_failures: 0,
            evictions: 0,
        }
    }
}

impl<M> TypeTiers<M> {
    fn stats(&self) -> TypeStats {
        TypeStats {
            metadata_entries: self.metadata.len(),
            full_entries: self.full.len(),
            hits: self.hits,
            misses: self.misses,
            load_failures: self.load_failures,
            evictions: self.evictions,
        }
    }

    fn drop_all(&mut self) {
        self.metadata.clear();
        self.full.clear();
        self.generation += 1;
    }

    /// Remove the oldest-accessed full models past `max`, returning their ids.
    fn evict_excess(&mut self, max: usize) -> Vec<String> {
        if self.full.len() <= max {
            return Vec::new();
        }
        let excess = self.full.len() - max;

        let mut by_age: Vec<(Timestamp, u64, &String)> = self
            .full
            .iter()
            .map(|(id, cached)| (cached.last_accessed, cached.access_seq, id))
            .collect();
        by_age.sort();

        let victims: Vec<String> = by_age
            .into_iter()
            .take(excess)
            .map(|(_, _, id)| id.clone())
            .collect();
        for id in &victims {
            self.full.remove(id);
        }
        self.evictions += victims.len() as u64;
        victims
    }
}

/// Lazily populated metadata index plus bounded full-model cache.
pub struct LazyModelLoader<M> {
    types: RwLock<HashMap<ModelType, Arc<Mutex<TypeTiers<M>>>>>,
    config: LoaderConfig,
    clock: SharedClock,
    access_seq: AtomicU64,
}

impl<M> std::fmt::Debug for LazyModelLoader<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyModelLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<M: Clone + Send + 'static> LazyModelLoader<M> {
    pub fn new(config: LoaderConfig, clock: SharedClock) -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            config,
            clock,
            access_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn tiers(&self, model_type: ModelType) -> Arc<Mutex<TypeTiers<M>>> {
        {
            let types = self.types.read().unwrap_or_else(|p| p.into_inner());
            if let Some(tiers) = types.get(&model_type) {
                return tiers.clone();
            }
        }
        let mut types = self.types.write().unwrap_or_else(|p| p.into_inner());
        types.entry(model_type).or_default().clone()
    }

    fn lock(tiers: &Mutex<TypeTiers<M>>, model_type: ModelType) -> MutexGuard<'_, TypeTiers<M>> {
        tiers.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(model_type = %model_type, "Loader lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed)
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Bind closures as the data source for `model_type`.
    pub fn register<L, A>(&self, model_type: ModelType, load_by_id: L, load_all_metadata: A)
    where
        L: Fn(&str) -> Result<Option<M>, LoadError> + Send + Sync + 'static,
        A: Fn() -> Result<Vec<ModelMetadata>, LoadError> + Send + Sync + 'static,
    {
        self.register_source(model_type, Arc::new(FnSource::new(load_by_id, load_all_metadata)));
    }

    /// Bind a data source for `model_type`, replacing any previous one.
    pub fn register_source(&self, model_type: ModelType, source: Arc<dyn ModelSource<M>>) {
        let tiers = self.tiers(model_type);
        Self::lock(&tiers, model_type).source = Some(source);
        tracing::debug!(model_type = %model_type, "Registered model source");
    }

    fn source_for(&self, model_type: ModelType) -> Option<Arc<dyn ModelSource<M>>> {
        let tiers = self.tiers(model_type);
        let source = Self::lock(&tiers, model_type).source.clone();
        if source.is_none() {
            let err = LoadError::NotRegistered { model_type };
            tracing::warn!(model_type = %model_type, error = %err, "Load skipped");
        }
        source
    }

    // ========================================================================
    // METADATA TIER
    // ========================================================================

    /// Refresh the metadata index for `model_type` from its source.
    ///
    /// Returns the freshly loaded records, or an empty list when the source
    /// is missing or fails.
    pub fn load_metadata(&self, model_type: ModelType) -> Vec<ModelMetadata> {
        let Some(source) = self.source_for(model_type) else {
            return Vec::new();
        };

        let loaded = match source.load_all_metadata() {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(model_type = %model_type, error = %e, "Metadata load failed");
                let tiers = self.tiers(model_type);
                Self::lock(&tiers, model_type).load_failures += 1;
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let loaded: Vec<ModelMetadata> = loaded
            .into_iter()
            .map(|mut meta| {
                meta.last_accessed = Some(now);
                meta
            })
            .collect();

        let tiers = self.tiers(model_type);
        let mut tiers = Self::lock(&tiers, model_type);

        let mut new_ids = loaded
            .iter()
            .filter(|meta| !tiers.metadata.contains_key(&meta.id))
            .map(|meta| meta.id.as_str())
            .collect::<Vec<_>>();
        new_ids.sort_unstable();
        new_ids.dedup();

        if tiers.metadata.len() + new_ids.len() > self.config.max_metadata_size {
            tracing::info!(
                model_type = %model_type,
                indexed = tiers.metadata.len(),
                incoming = loaded.len(),
                "Metadata index full, resetting type"
            );
            tiers.drop_all();
        }

        for meta in &loaded {
            tiers.metadata.insert(meta.id.clone(), meta.clone());
        }
        tracing::debug!(model_type = %model_type, count = loaded.len(), "Metadata loaded");
        loaded
    }

    /// Indexed metadata for one id. Never calls the source.
    pub fn get_metadata(&self, model_type: ModelType, id: &str) -> Option<ModelMetadata> {
        let now = self.clock.now();
        let tiers = self.tiers(model_type);
        let mut tiers = Self::lock(&tiers, model_type);
        tiers.metadata.get_mut(id).map(|meta| {
            meta.last_accessed = Some(now);
            meta.clone()
        })
    }

    /// Every indexed record of `model_type`, sorted by display name.
    pub fn list_metadata(&self, model_type: ModelType) -> Vec<ModelMetadata> {
        let tiers = self.tiers(model_type);
        let tiers = Self::lock(&tiers, model_type);
        let mut all: Vec<ModelMetadata> = tiers.metadata.values().cloned().collect();
        all.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
        all
    }

    // ========================================================================
    // FULL TIER
    // ========================================================================

    /// Full model for `id`, loading it through the source on a miss.
    pub fn get_model(&self, model_type: ModelType, id: &str) -> Option<M> {
        let tiers = self.tiers(model_type);
        let generation = {
            let now = self.clock.now();
            let seq = self.next_seq();
            let mut guard = Self::lock(&tiers, model_type);
            if let Some(cached) = guard.full.get_mut(id) {
                cached.last_accessed = now;
                cached.access_seq = seq;
                let data = cached.data.clone();
                guard.hits += 1;
                return Some(data);
            }
            guard.misses += 1;
            guard.generation
        };

        let source = self.source_for(model_type)?;
        let loaded = match source.load_by_id(id) {
            Ok(Some(model)) => model,
            Ok(None) => {
                tracing::debug!(model_type = %model_type, id, "Model not found");
                return None;
            }
            Err(e) => {
                tracing::warn!(model_type = %model_type, id, error = %e, "Model load failed");
                Self::lock(&tiers, model_type).load_failures += 1;
                return None;
            }
        };

        let now = self.clock.now();
        let seq = self.next_seq();
        let mut guard = Self::lock(&tiers, model_type);
        if guard.generation != generation {
            tracing::debug!(model_type = %model_type, id, "Invalidated during load, not caching");
            return Some(loaded);
        }
        guard.full.insert(
            id.to_string(),
            CachedModel {
                data: loaded.clone(),
                last_accessed: now,
                access_seq: seq,
            },
        );
        let evicted = guard.evict_excess(self.config.max_cache_size);
        if !evicted.is_empty() {
            tracing::debug!(model_type = %model_type, evicted = evicted.len(), "Evicted models");
        }
        Some(loaded)
    }

    /// True if `id` is in the full tier.
    pub fn is_cached(&self, model_type: ModelType, id: &str) -> bool {
        let tiers = self.tiers(model_type);
        let cached = Self::lock(&tiers, model_type).full.contains_key(id);
        cached
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Drop one id from both tiers.
    pub fn invalidate(&self, model_type: ModelType, id: &str) {
        let tiers = self.tiers(model_type);
        let mut tiers = Self::lock(&tiers, model_type);
        tiers.metadata.remove(id);
        tiers.full.remove(id);
        tiers.generation += 1;
    }

    /// Drop both tiers for one type, or for every type with `None`.
    /// Registered sources are kept.
    pub fn clear(&self, model_type: Option<ModelType>) {
        let targets: Vec<(ModelType, Arc<Mutex<TypeTiers<M>>>)> = {
            let types = self.types.read().unwrap_or_else(|p| p.into_inner());
            types
                .iter()
                .filter(|(ty, _)| model_type.map_or(true, |wanted| wanted == **ty))
                .map(|(ty, tiers)| (*ty, tiers.clone()))
                .collect()
        };
        for (ty, tiers) in targets {
            Self::lock(&tiers, ty).drop_all();
        }
    }

    pub fn get_stats(&self) -> LoaderStats {
        let snapshot: Vec<(ModelType, Arc<Mutex<TypeTiers<M>>>)> = {
            let types = self.types.read().unwrap_or_else(|p| p.into_inner());
            types.iter().map(|(ty, tiers)| (*ty, tiers.clone())).collect()
        };
        LoaderStats {
            types: snapshot
                .into_iter()
                .map(|(ty, tiers)| {
                    let stats = Self::lock(&tiers, ty).stats();
                    (ty, stats)
                })
                .collect(),
            max_cache_size: self.config.max_cache_size,
            max_metadata_size: self.config.max_metadata_size,
        }
    }
}
