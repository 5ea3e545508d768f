//! Bounded least-recently-used memo of rendered artifacts.
//!
//! Keyed purely by structure content, so one cache can serve every dataset opened in
//! the process. The cache is an ordinary value: create it once at startup and hand
//! it to whatever renders pages.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::render::{Artifact, RenderKey, Renderer};

pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Read-only snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    fn new(size: usize, capacity: usize, hits: u64, misses: u64) -> Self {
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };
        Self {
            size,
            capacity,
            hits,
            misses,
            hit_rate,
        }
    }
}

struct Entry {
    artifact: Artifact,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<RenderKey, Entry>,
    /// tick -> key, oldest first
    recency: BTreeMap<u64, RenderKey>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Marks `key` most recently used and returns its artifact.
    fn touch(&mut self, key: &RenderKey) -> Option<Artifact> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.clone());
        Some(entry.artifact.clone())
    }

    fn insert(&mut self, key: RenderKey, artifact: Artifact, capacity: usize) {
        let tick = self.next_tick();
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, Entry { artifact, tick });
        while self.entries.len() > capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            trace!(key = %oldest, "evicted render cache entry");
        }
    }
}

pub struct RenderCache {
    capacity: NonZeroUsize,
    inner: Mutex<Inner>,
}

impl RenderCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Capacity from configuration; zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Entries are only mutated after compute returns, so a poisoned lock still
        // holds consistent bookkeeping.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached artifact for `key`, computing and inserting it on a miss.
    ///
    /// `compute` runs without the lock held. If another caller filled the same key
    /// in the meantime, its entry wins and the fresh result is dropped.
    pub fn get_or_compute<F>(&self, key: &RenderKey, compute: F) -> Artifact
    where
        F: FnOnce(&RenderKey) -> Artifact,
    {
        {
            let mut inner = self.lock();
            if let Some(artifact) = inner.touch(key) {
                inner.hits += 1;
                return artifact;
            }
            inner.misses += 1;
        }
        debug!(key = %key, "render cache miss");

        let artifact = compute(key);

        let mut inner = self.lock();
        if let Some(existing) = inner.touch(key) {
            return existing;
        }
        inner.insert(key.clone(), artifact.clone(), self.capacity.get());
        artifact
    }

    /// Renders through `renderer`, caching failures as the empty artifact.
    pub fn get_or_render(&self, key: &RenderKey, renderer: &dyn Renderer) -> Artifact {
        self.get_or_compute(key, |k| match renderer.render(k) {
            Ok(artifact) => artifact,
            Err(e) => {
                debug!(key = %k, error = %e, "structure could not be rendered");
                Artifact::empty()
            }
        })
    }

    /// Whether `key` is cached, without touching recency or counters.
    pub fn contains(&self, key: &RenderKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats::new(
            inner.entries.len(),
            self.capacity.get(),
            inner.hits,
            inner.misses,
        )
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        *inner = Inner::default();
        debug!("render cache cleared");
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use std::cell::Cell;

    fn key(s: &str) -> RenderKey {
        RenderKey::new(s).unwrap()
    }

    #[test]
    fn test_hit_does_not_recompute() {
        let cache = RenderCache::with_capacity(4);
        let calls = Cell::new(0);
        let compute = |k: &RenderKey| {
            calls.set(calls.get() + 1);
            Artifact::new(k.as_str().to_string())
        };
        assert_eq!(cache.get_or_compute(&key("A"), compute).as_str(), "A");
        assert_eq!(cache.get_or_compute(&key("A"), compute).as_str(), "A");
        assert_eq!(calls.get(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = RenderCache::with_capacity(2);
        let fill = |k: &RenderKey| Artifact::new(k.as_str().to_string());
        cache.get_or_compute(&key("A"), fill);
        cache.get_or_compute(&key("B"), fill);
        // touching A makes B the eviction candidate
        cache.get_or_compute(&key("A"), fill);
        cache.get_or_compute(&key("C"), fill);
        assert!(cache.contains(&key("A")));
        assert!(!cache.contains(&key("B")));
        assert!(cache.contains(&key("C")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_empty_stats() {
        let cache = RenderCache::with_capacity(3);
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let cache = RenderCache::with_capacity(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_failed_render_is_cached_as_empty() {
        let cache = RenderCache::with_capacity(2);
        let calls = Cell::new(0);
        let failing = |_: &RenderKey| -> Result<Artifact, RenderError> {
            calls.set(calls.get() + 1);
            Err(RenderError::Empty)
        };
        // Cell is not Sync, so go through get_or_compute with the same mapping.
        let compute = |k: &RenderKey| failing(k).unwrap_or_default();
        assert!(cache.get_or_compute(&key("bad"), compute).is_empty());
        assert!(cache.get_or_compute(&key("bad"), compute).is_empty());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_get_or_render_maps_errors() {
        let cache = RenderCache::with_capacity(2);
        let renderer = |_: &RenderKey| Err::<Artifact, _>(RenderError::Empty);
        assert!(cache.get_or_render(&key("x"), &renderer).is_empty());
        assert!(cache.contains(&key("x")));
    }

    #[test]
    fn test_clear_resets() {
        let cache = RenderCache::with_capacity(2);
        cache.get_or_compute(&key("A"), |_| Artifact::new("a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_string(&CacheStats::new(1, 2, 3, 1)).unwrap();
        assert!(json.contains("\"hitRate\":0.75"));
    }
}
