//! Two-tier layout cache: a bounded in-memory map consulted first, backed by
//! a durable store that survives restarts.

mod durable;
mod memory;

pub use durable::{DurableStore, DurableTier, LoadState, PendingLoad, SqliteStore};

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::ir::{PositionMap, Snapshot};
use memory::MemoryTier;

pub enum CacheLookup {
    Hit(PositionMap),
    /// Memory missed; the durable tier is being read in the background.
    Pending(PendingLoad),
    Miss,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
}

/// Shareable between coordinators: the memory tier is behind a mutex and the
/// durable tier serializes through its own I/O thread.
pub struct LayoutCache {
    memory: Mutex<MemoryTier>,
    durable: Option<DurableTier>,
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl LayoutCache {
    pub fn in_memory(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    pub fn with_store<S: DurableStore + 'static>(
        capacity: usize,
        store: S,
    ) -> Result<Self, CacheError> {
        Ok(Self::build(capacity, Some(DurableTier::spawn(store)?)))
    }

    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        match &config.durable_path {
            Some(path) => Self::with_store(config.memory_capacity, SqliteStore::open(path)?),
            None => Ok(Self::in_memory(config.memory_capacity)),
        }
    }

    /// Like [`LayoutCache::open`], but a durable tier that cannot be opened
    /// degrades to a memory-only cache. The error is handed back for reporting.
    pub fn open_or_memory(config: &CacheConfig) -> (Self, Option<CacheError>) {
        match Self::open(config) {
            Ok(cache) => (cache, None),
            Err(err) => {
                tracing::warn!(error = %err, "durable layout cache unavailable, using memory only");
                (Self::in_memory(config.memory_capacity), Some(err))
            }
        }
    }

    fn build(capacity: usize, durable: Option<DurableTier>) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(capacity)),
            durable,
            memory_hits: AtomicU64::new(0),
            durable_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Non-blocking lookup: memory tier first, then a background durable read.
    pub fn lookup(&self, key: Fingerprint) -> CacheLookup {
        if let Some(positions) = self.memory().get(key) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Hit(positions.clone());
        }
        match &self.durable {
            Some(durable) => CacheLookup::Pending(durable.load(key)),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
        }
    }

    /// Records the outcome of a durable read, promoting hits into memory.
    pub fn resolve_load(
        &self,
        key: Fingerprint,
        loaded: Option<PositionMap>,
    ) -> Option<PositionMap> {
        match loaded {
            Some(positions) => {
                self.durable_hits.fetch_add(1, Ordering::Relaxed);
                self.insert_memory(key, positions.clone());
                Some(positions)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Blocking lookup for callers off the interactive thread.
    pub fn get(&self, key: Fingerprint) -> Option<PositionMap> {
        match self.lookup(key) {
            CacheLookup::Hit(positions) => Some(positions),
            CacheLookup::Pending(load) => {
                let loaded = load.wait();
                self.resolve_load(key, loaded)
            }
            CacheLookup::Miss => None,
        }
    }

    /// Writes both tiers. The durable write is queued and never waited on.
    pub fn put(&self, key: Fingerprint, positions: PositionMap) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if let Some(durable) = &self.durable {
            durable.store(key, positions.clone());
        }
        self.insert_memory(key, positions);
    }

    fn insert_memory(&self, key: Fingerprint, positions: PositionMap) {
        let evicted = self.memory().insert(key, positions);
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "layout cache memory tier evicted entries");
        }
    }

    pub fn clear(&self) {
        self.memory().clear();
        if let Some(durable) = &self.durable {
            durable.clear();
        }
    }

    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Keeps only finite positions for ids present in `snapshot`. `None` when
/// nothing overlaps.
pub fn filter_to_snapshot(positions: &PositionMap, snapshot: &Snapshot) -> Option<PositionMap> {
    let ids: HashSet<&str> = snapshot.nodes.iter().map(|node| node.id.as_str()).collect();
    let filtered: PositionMap = positions
        .iter()
        .filter(|(id, position)| ids.contains(id.as_str()) && position.is_finite())
        .map(|(id, position)| (id.clone(), *position))
        .collect();
    if filtered.is_empty() {
        None
    } else {
        Some(filtered)
    }
}
