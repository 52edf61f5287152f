use crate::checksum::Checksum;
use serde::{Deserialize, Serialize};

/// Snapshot of the module cache counters.
///
/// Hit counters only grow during a cache's lifetime; element and size
/// counters describe the tiers at the moment of the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub hits_pinned_memory_cache: u32,
    pub hits_memory_cache: u32,
    pub hits_fs_cache: u32,
    pub misses: u32,
    pub elements_pinned_memory_cache: usize,
    pub elements_memory_cache: usize,
    pub size_pinned_memory_cache: usize,
    pub size_memory_cache: usize,
}

impl Metrics {
    /// Total number of resolutions served from any tier
    pub fn total_hits(&self) -> u64 {
        self.hits_pinned_memory_cache as u64
            + self.hits_memory_cache as u64
            + self.hits_fs_cache as u64
    }
}

/// Per-module counters for the pinned tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerModuleMetrics {
    /// Hits served from the pinned tier for this module
    pub hits: u32,
    /// Estimated in-memory size of the module
    pub size: usize,
}

/// Per-checksum metrics of every pinned module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedMetrics {
    pub per_module: Vec<(Checksum, PerModuleMetrics)>,
}
