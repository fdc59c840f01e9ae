// rust/corpus-core/src/dataset/cache.rs

//! Bounded least-recently-used sample cache.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::sample::Sample;

/// LRU cache from logical index to [`Sample`].
///
/// A capacity of 0 disables storage: every lookup misses and inserts are
/// dropped. Both hits and inserts count as a use.
pub struct SampleCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    /// index -> (sample, last-use tick)
    entries: HashMap<usize, (Sample, u64)>,
    /// last-use tick -> index, oldest first
    recency: BTreeMap<u64, usize>,
    tick: u64,
}

impl CacheInner {
    fn touch(&mut self, idx: usize) -> Option<Sample> {
        self.tick += 1;
        let tick = self.tick;
        let (sample, last) = self.entries.get_mut(&idx)?;
        self.recency.remove(last);
        *last = tick;
        self.recency.insert(tick, idx);
        Some(sample.clone())
    }
}

impl SampleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.lock().entries.contains_key(&idx)
    }

    /// Looks up `idx`, marking it most recently used on a hit.
    pub fn get(&self, idx: usize) -> Option<Sample> {
        if !self.is_enabled() {
            return None;
        }
        self.lock().touch(idx)
    }

    /// Stores `sample` under `idx`, evicting the least recently used entry
    /// when full.
    pub fn insert(&self, idx: usize, sample: Sample) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.lock();
        if let Some((_, last)) = inner.entries.remove(&idx) {
            inner.recency.remove(&last);
        }
        while inner.entries.len() >= self.capacity {
            let Some((_, oldest)) = inner.recency.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(idx, (sample, tick));
        inner.recency.insert(tick, idx);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize) -> Sample {
        Sample::new(format!("s{i}"))
    }

    #[test]
    fn test_zero_capacity_is_pass_through() {
        let cache = SampleCache::new(0);
        cache.insert(0, sample(0));
        assert!(cache.get(0).is_none());
        assert!(cache.is_empty());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = SampleCache::new(2);
        cache.insert(0, sample(0));
        cache.insert(1, sample(1));

        // 0 becomes most recent, so 1 is evicted next
        assert_eq!(cache.get(0).unwrap().id(), "s0");
        cache.insert(2, sample(2));

        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_refreshes_recency() {
        let cache = SampleCache::new(2);
        cache.insert(0, sample(0));
        cache.insert(1, sample(1));
        cache.insert(0, sample(0));
        cache.insert(2, sample(2));

        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear() {
        let cache = SampleCache::new(4);
        for i in 0..4 {
            cache.insert(i, sample(i));
        }
        assert_eq!(cache.len(), 4);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(3).is_none());
    }
}
