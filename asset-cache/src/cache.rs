//! Thread-safe bounded cache shared by concurrent pipeline runs.
//!
//! The lock guards only the map mutation. Callers do their own loading outside
//! of it, so a get-miss / load / put sequence is not atomic: two concurrent
//! misses on one key may both load and both `put`. Loaded values for one key
//! are interchangeable, so the last write simply wins.

use parking_lot::Mutex;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::lru::LruCache;

/// Snapshot of a cache's occupancy and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded key→value cache with least-recently-used eviction.
pub struct AssetCache<K, V> {
    name: String,
    inner: Mutex<LruCache<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> AssetCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the cached value and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.inner.lock().get(key);
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// Inserts or replaces a value; evicts the least recently used entry when
    /// the insert exceeds capacity.
    pub fn put(&self, key: K, value: V) {
        let evicted = self.inner.lock().put(key, value);
        if evicted.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache = %self.name, "Evicted least recently used entry");
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().peek(key).is_some()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.len() >= inner.capacity()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> CacheStats {
        let (size, capacity) = {
            let inner = self.inner.lock();
            (inner.len(), inner.capacity())
        };
        CacheStats {
            name: self.name.clone(),
            size,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
