//! Two-generation cache for rendered directory listings.
//!
//! This is an approximate LRU: instead of per-key timestamps there are two
//! maps, `fresh` and `stale`. Writes go to `fresh`; when `fresh` grows past
//! the capacity it becomes the new `stale` (dropping the previous one) and an
//! empty `fresh` is started. A hit in `stale` copies the entry back into
//! `fresh`. Eviction is therefore O(1) amortised per insertion but happens in
//! batches of up to `capacity` keys, not one least-recently-used key at a time.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Which generation currently holds a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Fresh,
    Stale,
}

#[derive(Debug)]
struct Generations<V> {
    fresh: HashMap<String, V>,
    stale: HashMap<String, V>,
}

impl<V> Default for Generations<V> {
    fn default() -> Self {
        Self {
            fresh: HashMap::new(),
            stale: HashMap::new(),
        }
    }
}

impl<V> Generations<V> {
    fn insert(&mut self, key: String, value: V, capacity: usize) {
        self.fresh.insert(key, value);
        if self.fresh.len() > capacity {
            debug!(
                "Directory cache rollover: demoting {} entries, dropping {}",
                self.fresh.len(),
                self.stale.len()
            );
            self.stale = std::mem::take(&mut self.fresh);
        }
    }
}

/// Bounded cache keyed by the serialized browse query.
///
/// Capacity 0 means caching is disabled outright: `get` always misses and
/// `set` stores nothing.
#[derive(Debug)]
pub struct DirectoryCache<V> {
    capacity: usize,
    generations: RwLock<Generations<V>>,
}

impl<V: Clone> DirectoryCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            generations: RwLock::new(Generations::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key`, promoting it into the fresh generation on a stale hit.
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }

        {
            let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = generations.fresh.get(key) {
                return Some(value.clone());
            }
            if !generations.stale.contains_key(key) {
                return None;
            }
        }

        // Stale hit: re-check under the write lock, a rollover may have
        // happened in between.
        let mut generations = self.generations.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = generations.fresh.get(key) {
            return Some(value.clone());
        }
        let value = generations.stale.get(key)?.clone();
        generations.insert(key.to_string(), value.clone(), self.capacity);
        Some(value)
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        if !self.is_enabled() {
            return;
        }
        let mut generations = self.generations.write().unwrap_or_else(PoisonError::into_inner);
        generations.insert(key.into(), value, self.capacity);
    }

    /// Generation holding `key` without promoting it
    pub fn generation_of(&self, key: &str) -> Option<Generation> {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        if generations.fresh.contains_key(key) {
            Some(Generation::Fresh)
        } else if generations.stale.contains_key(key) {
            Some(Generation::Stale)
        } else {
            None
        }
    }

    /// Number of distinct keys across both generations
    pub fn len(&self) -> usize {
        let generations = self.generations.read().unwrap_or_else(PoisonError::into_inner);
        generations
            .fresh
            .len()
            + generations
                .stale
                .keys()
                .filter(|key| !generations.fresh.contains_key(*key))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut generations = self.generations.write().unwrap_or_else(PoisonError::into_inner);
        *generations = Generations::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(i: usize) -> String {
        format!("{{\"p\":[\"file\",\"dir{}\"],\"a\":0}}", i)
    }

    #[test]
    fn test_fresh_hit() {
        let cache = DirectoryCache::new(4);
        cache.set("k", 1u32);
        assert_eq!(cache.get("k"), Some(1));
        assert_eq!(cache.generation_of("k"), Some(Generation::Fresh));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_rollover_keeps_first_key_in_stale() {
        let capacity = 3;
        let cache = DirectoryCache::new(capacity);
        for i in 0..=capacity {
            cache.set(key(i), i);
        }

        // N+1 insertions triggered exactly one rollover
        assert_eq!(cache.generation_of(&key(0)), Some(Generation::Stale));
        assert_eq!(cache.get(&key(0)), Some(0));
        assert_eq!(cache.generation_of(&key(0)), Some(Generation::Fresh));
    }

    #[test]
    fn test_second_rollover_without_access_evicts() {
        let capacity = 3;
        let cache = DirectoryCache::new(capacity);
        for i in 0..=capacity {
            cache.set(key(i), i);
        }
        assert_eq!(cache.generation_of(&key(0)), Some(Generation::Stale));

        // Fill fresh past capacity again without touching key 0
        for i in 100..=(100 + capacity) {
            cache.set(key(i), i);
        }
        assert_eq!(cache.generation_of(&key(0)), None);
        assert_eq!(cache.get(&key(0)), None);
    }

    #[test]
    fn test_promotion_is_idempotent() {
        let cache = DirectoryCache::new(2);
        cache.set("a", "alpha".to_string());
        cache.set("b", "beta".to_string());
        cache.set("c", "gamma".to_string());
        assert_eq!(cache.generation_of("a"), Some(Generation::Stale));

        let first = cache.get("a");
        assert_eq!(cache.generation_of("a"), Some(Generation::Fresh));
        let second = cache.get("a");
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("alpha"));
        assert_eq!(cache.generation_of("a"), Some(Generation::Fresh));
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = DirectoryCache::disabled();
        assert!(!cache.is_enabled());
        cache.set("a", 1u8);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.generation_of("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_len_counts_promoted_keys_once() {
        let cache = DirectoryCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.len(), 3);
        cache.get("a");
        assert_eq!(cache.len(), 3);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(DirectoryCache::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let k = key(i % 40);
                        cache.set(k.clone(), i);
                        let _ = cache.get(&key((i + t) % 40));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 2 * (16 + 1));
    }
}
