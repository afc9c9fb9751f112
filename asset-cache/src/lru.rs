//! Single-threaded LRU map used under the `AssetCache` lock.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A simple LRU (Least Recently Used) cache.
///
/// `order` holds keys from most recently used (front) to least recently used (back).
pub struct LruCache<K, V> {
    /// The maximum number of entries the cache can hold
    capacity: usize,

    /// The cached entries
    entries: HashMap<K, V>,

    /// The order of entries (for LRU eviction)
    order: VecDeque<K>,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Creates a new LRU cache. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Gets a value and marks the key as most recently used.
    ///
    /// A miss leaves the cache untouched.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let value = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(value)
    }

    /// Reads a value without updating recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Inserts or updates a key-value pair and marks it most recently used.
    ///
    /// If the insert pushes the cache past capacity, exactly the least recently
    /// used entry is evicted and returned.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return None;
        }
        self.order.push_front(key);

        if self.entries.len() > self.capacity {
            if let Some(lru_key) = self.order.pop_back() {
                if let Some(lru_value) = self.entries.remove(&lru_key) {
                    return Some((lru_key, lru_value));
                }
            }
        }
        None
    }

    /// Removes a key-value pair from the cache.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.order.retain(|k| k != key);
        self.entries.remove(key)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_front(k);
            }
        }
    }
}
