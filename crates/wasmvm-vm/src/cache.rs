//! Process-wide cache of compiled contract modules.
//!
//! Modules live in one of two tiers: a pinned tier that only changes through
//! explicit `pin`/`unpin`, and a regular tier bounded by a byte budget and
//! evicted least-recently-used first. Anything in neither tier is compiled
//! from the code store on demand.

use crate::engine::{self, static_analysis};
use crate::error::{VmError, VmResult};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use wasmi::{Engine, Module};
use wasmvm_storage::CodeStore;
use wasmvm_types::{AnalysisReport, Checksum, Metrics, PerModuleMetrics, PinnedMetrics, Size};

/// Cache construction parameters
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub data_dir: PathBuf,
    pub available_capabilities: HashSet<String>,
    /// Byte budget of the regular tier
    pub memory_cache_size: Size,
}

/// A compiled module and its accounted size.
#[derive(Clone)]
pub struct CachedModule {
    pub module: Arc<Module>,
    /// Bytes charged against the tier holding the module. This is the length
    /// of the wasm bytecode, a proxy for the compiled module's footprint: the
    /// interpreter's translated code is usually several times larger.
    pub size: usize,
}

impl std::fmt::Debug for CachedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedModule").field("size", &self.size).finish()
    }
}

struct PinnedEntry {
    module: CachedModule,
    hits: u32,
}

/// LRU tier bounded by the total size of its entries.
struct MemoryTier {
    entries: LruCache<Checksum, CachedModule>,
    size: usize,
    limit: usize,
}

impl MemoryTier {
    fn new(limit: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            size: 0,
            limit,
        }
    }

    fn get(&mut self, checksum: &Checksum) -> Option<CachedModule> {
        self.entries.get(checksum).cloned()
    }

    /// Insert, evicting least recently used entries until the new one fits.
    /// An entry larger than the whole budget is not retained.
    fn insert(&mut self, checksum: Checksum, module: CachedModule) -> bool {
        if module.size > self.limit {
            tracing::debug!(%checksum, size = module.size, limit = self.limit, "Module exceeds memory cache budget");
            return false;
        }
        self.remove(&checksum);
        while self.size + module.size > self.limit {
            match self.entries.pop_lru() {
                Some((evicted, old)) => {
                    self.size -= old.size;
                    tracing::debug!(checksum = %evicted, size = old.size, "Evicted module from memory cache");
                }
                None => break,
            }
        }
        self.size += module.size;
        self.entries.put(checksum, module);
        true
    }

    fn remove(&mut self, checksum: &Checksum) -> Option<CachedModule> {
        let removed = self.entries.pop(checksum)?;
        self.size -= removed.size;
        Some(removed)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.size = 0;
    }
}

#[derive(Default)]
struct Counters {
    hits_pinned: u32,
    hits_memory: u32,
    hits_fs: u32,
    misses: u32,
}

struct CacheState {
    pinned: HashMap<Checksum, PinnedEntry>,
    memory: MemoryTier,
    counters: Counters,
}

impl CacheState {
    /// Serve from a memory tier, counting the hit.
    fn lookup(&mut self, checksum: &Checksum) -> Option<CachedModule> {
        if let Some(entry) = self.pinned.get_mut(checksum) {
            entry.hits = entry.hits.saturating_add(1);
            self.counters.hits_pinned = self.counters.hits_pinned.saturating_add(1);
            return Some(entry.module.clone());
        }
        let module = self.memory.get(checksum)?;
        self.counters.hits_memory = self.counters.hits_memory.saturating_add(1);
        Some(module)
    }

    fn count_failure(&mut self, err: &VmError) {
        if matches!(err, VmError::CodeNotFound(_)) {
            self.counters.misses = self.counters.misses.saturating_add(1);
        }
    }
}

/// Module cache backed by a file-system code store.
pub struct ModuleCache {
    engine: Engine,
    code_store: CodeStore,
    available_capabilities: HashSet<String>,
    state: Mutex<CacheState>,
    /// One lock per checksum currently being compiled from disk
    loading: Mutex<HashMap<Checksum, Arc<Mutex<()>>>>,
}

impl ModuleCache {
    pub fn new(options: CacheOptions) -> VmResult<Self> {
        let code_store = CodeStore::open(&options.data_dir)?;
        tracing::info!(
            data_dir = %options.data_dir.display(),
            memory_cache_size = options.memory_cache_size.bytes(),
            capabilities = options.available_capabilities.len(),
            "Opened module cache"
        );

        Ok(Self {
            engine: engine::new_engine(),
            code_store,
            available_capabilities: options.available_capabilities,
            state: Mutex::new(CacheState {
                pinned: HashMap::new(),
                memory: MemoryTier::new(options.memory_cache_size.bytes()),
                counters: Counters::default(),
            }),
            loading: Mutex::new(HashMap::new()),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Validate bytecode and persist it. Nothing is compiled into the cache.
    pub fn save_wasm(&self, wasm: &[u8]) -> VmResult<Checksum> {
        static_analysis::check_size(wasm)?;
        let module = engine::compile(&self.engine, wasm)?;
        static_analysis::check_wasm(&module, &self.available_capabilities)?;

        let checksum = self.code_store.save(wasm)?;
        tracing::info!(%checksum, size = wasm.len(), "Stored contract code");
        Ok(checksum)
    }

    pub fn load_wasm(&self, checksum: &Checksum) -> VmResult<Vec<u8>> {
        Ok(self.code_store.load(checksum)?)
    }

    fn compile_from_store(&self, checksum: &Checksum) -> VmResult<CachedModule> {
        let wasm = self.load_wasm(checksum)?;
        let module = engine::compile(&self.engine, &wasm)?;
        Ok(CachedModule {
            module: Arc::new(module),
            size: wasm.len(),
        })
    }

    /// Run `op` while holding the compile lock of `checksum`, so at most one
    /// thread loads a given code from the store at a time.
    fn single_flight<T>(&self, checksum: &Checksum, op: impl FnOnce() -> VmResult<T>) -> VmResult<T> {
        let flight = self.loading.lock().entry(*checksum).or_default().clone();
        let result = {
            let _guard = flight.lock();
            op()
        };
        self.loading.lock().remove(checksum);
        result
    }

    /// Get the compiled module for `checksum`: pinned tier first, then the
    /// regular tier, then a compile from the code store.
    pub fn resolve(&self, checksum: &Checksum) -> VmResult<CachedModule> {
        if let Some(module) = self.state.lock().lookup(checksum) {
            return Ok(module);
        }

        self.single_flight(checksum, || {
            // Another thread may have finished the compile while we waited
            if let Some(module) = self.state.lock().lookup(checksum) {
                return Ok(module);
            }

            let result = self.compile_from_store(checksum);
            let mut state = self.state.lock();
            match result {
                Ok(module) => {
                    state.counters.hits_fs = state.counters.hits_fs.saturating_add(1);
                    state.memory.insert(*checksum, module.clone());
                    tracing::debug!(%checksum, size = module.size, "Compiled module from code store");
                    Ok(module)
                }
                Err(err) => {
                    state.count_failure(&err);
                    Err(err)
                }
            }
        })
    }

    /// Copy a module from the regular tier into the pinned tier, counting a
    /// memory hit. Returns false when the module is in neither tier.
    fn pin_cached(state: &mut CacheState, checksum: &Checksum) -> bool {
        if state.pinned.contains_key(checksum) {
            return true;
        }
        match state.memory.get(checksum) {
            Some(module) => {
                state.counters.hits_memory = state.counters.hits_memory.saturating_add(1);
                state.pinned.insert(*checksum, PinnedEntry { module, hits: 0 });
                tracing::info!(%checksum, "Pinned module from memory cache");
                true
            }
            None => false,
        }
    }

    /// Keep a module in the pinned tier. Pinning twice is a no-op.
    pub fn pin(&self, checksum: &Checksum) -> VmResult<()> {
        if Self::pin_cached(&mut self.state.lock(), checksum) {
            return Ok(());
        }

        self.single_flight(checksum, || {
            if Self::pin_cached(&mut self.state.lock(), checksum) {
                return Ok(());
            }

            let result = self.compile_from_store(checksum);
            let mut state = self.state.lock();
            match result {
                Ok(module) => {
                    state.counters.hits_fs = state.counters.hits_fs.saturating_add(1);
                    state.pinned.insert(*checksum, PinnedEntry { module, hits: 0 });
                    tracing::info!(%checksum, "Pinned module from code store");
                    Ok(())
                }
                Err(err) => {
                    state.count_failure(&err);
                    Err(err)
                }
            }
        })
    }

    /// Drop a module from the pinned tier. Unpinning stored code that is not
    /// pinned is a no-op; unknown code is an error.
    pub fn unpin(&self, checksum: &Checksum) -> VmResult<()> {
        if self.state.lock().pinned.remove(checksum).is_some() {
            tracing::info!(%checksum, "Unpinned module");
            return Ok(());
        }
        if !self.code_store.contains(checksum) {
            return Err(VmError::CodeNotFound(*checksum));
        }
        Ok(())
    }

    pub fn metrics(&self) -> Metrics {
        let state = self.state.lock();
        Metrics {
            hits_pinned_memory_cache: state.counters.hits_pinned,
            hits_memory_cache: state.counters.hits_memory,
            hits_fs_cache: state.counters.hits_fs,
            misses: state.counters.misses,
            elements_pinned_memory_cache: state.pinned.len(),
            elements_memory_cache: state.memory.len(),
            size_pinned_memory_cache: state.pinned.values().map(|e| e.module.size).sum(),
            size_memory_cache: state.memory.size,
        }
    }

    pub fn pinned_metrics(&self) -> PinnedMetrics {
        let state = self.state.lock();
        let mut per_module: Vec<(Checksum, PerModuleMetrics)> = state
            .pinned
            .iter()
            .map(|(checksum, entry)| {
                (
                    *checksum,
                    PerModuleMetrics {
                        hits: entry.hits,
                        size: entry.module.size,
                    },
                )
            })
            .collect();
        per_module.sort_by(|a, b| a.0.cmp(&b.0));
        PinnedMetrics { per_module }
    }

    /// Static report on stored code. Does not touch the cache counters.
    pub fn analyze(&self, checksum: &Checksum) -> VmResult<AnalysisReport> {
        let module = self.compile_from_store(checksum)?;
        Ok(static_analysis::analyze(&module.module))
    }

    /// Delete unpinned code from the code store and the regular tier.
    pub fn remove_wasm(&self, checksum: &Checksum) -> VmResult<()> {
        let mut state = self.state.lock();
        if state.pinned.contains_key(checksum) {
            return Err(VmError::InvalidArgument(format!(
                "Cannot remove pinned code {}",
                checksum
            )));
        }
        state.memory.remove(checksum);
        self.code_store.remove(checksum)?;
        tracing::info!(%checksum, "Removed contract code");
        Ok(())
    }

    /// Drop every cached module. Counters keep their values.
    pub fn release_all(&self) {
        let mut state = self.state.lock();
        let released = state.pinned.len() + state.memory.len();
        state.pinned.clear();
        state.memory.clear();
        tracing::info!(released, "Released module cache");
    }
}
