//! Access Pattern Analyzer
//!
//! Wraps any [`CacheStore`] and records hit/miss/eviction counts plus a
//! per-key access frequency table.
//!
//! Counting rules:
//! - `get` records a hit or a miss and one access for the key
//! - `set` records one access for the key, and an eviction when the inner
//!   cache reports a displaced key
//! - `has` and `delete` pass through uncounted
//!
//! `hot_keys` orders by access count, ties broken by first access (earlier
//! first), so the ranking never depends on hash-map iteration order.

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use super::CacheStore;

/// Analyzer statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AccessStats {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// hits / operations, 0.0 before the first lookup
    pub hit_rate: f64,
    /// Current entry count of the wrapped cache
    pub size: usize,
    /// Capacity evictions observed on `set`
    pub evictions: u64,
    /// Lookups recorded (hits + misses)
    pub operations: u64,
}

#[derive(Debug, Clone, Copy)]
struct KeyFrequency {
    count: u64,
    first_seen: u64,
}

#[derive(Debug, Default)]
struct FrequencyTable<K> {
    counts: HashMap<K, KeyFrequency>,
    next_seq: u64,
}

/// Cache wrapper that tracks access patterns
pub struct AccessAnalyzer<K, V, C> {
    inner: C,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    frequencies: Mutex<FrequencyTable<K>>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V, C> AccessAnalyzer<K, V, C>
where
    K: Eq + Hash + Clone,
    C: CacheStore<K, V>,
{
    /// Wrap a cache
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            frequencies: Mutex::new(FrequencyTable {
                counts: HashMap::new(),
                next_seq: 0,
            }),
            _value: PhantomData,
        }
    }

    fn record_access(&self, key: &K) {
        let mut guard = self.frequencies.lock();
        let table = &mut *guard;
        if let Some(freq) = table.counts.get_mut(key) {
            freq.count += 1;
            return;
        }
        table.counts.insert(
            key.clone(),
            KeyFrequency {
                count: 1,
                first_seen: table.next_seq,
            },
        );
        table.next_seq += 1;
    }

    /// Get a value, recording a hit or miss
    pub fn get(&self, key: &K) -> Option<V> {
        self.record_access(key);
        let value = self.inner.get(key);
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// Insert a value, recording an eviction if one happened
    pub fn set(&self, key: K, value: V) -> Option<K> {
        self.record_access(&key);
        let evicted = self.inner.set(key, value);
        if evicted.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Existence check (not counted)
    pub fn has(&self, key: &K) -> bool {
        self.inner.has(key)
    }

    /// Delete (not counted)
    pub fn delete(&self, key: &K) -> bool {
        self.inner.delete(key)
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> AccessStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let operations = hits + misses;
        AccessStats {
            hits,
            misses,
            hit_rate: if operations == 0 {
                0.0
            } else {
                hits as f64 / operations as f64
            },
            size: self.inner.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
            operations,
        }
    }

    /// The `limit` most frequently accessed keys
    ///
    /// Equal counts are ordered by first access, earliest first.
    pub fn hot_keys(&self, limit: usize) -> Vec<K> {
        let table = self.frequencies.lock();
        let mut ranked: Vec<(&K, &KeyFrequency)> = table.counts.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then(a.1.first_seen.cmp(&b.1.first_seen))
        });
        ranked
            .into_iter()
            .take(limit)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Access count recorded for a key
    pub fn frequency(&self, key: &K) -> u64 {
        self.frequencies
            .lock()
            .counts
            .get(key)
            .map(|f| f.count)
            .unwrap_or(0)
    }

    /// Zero all counters and forget frequencies
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        let mut table = self.frequencies.lock();
        table.counts.clear();
        table.next_seq = 0;
    }

    /// The wrapped cache
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Unwrap, returning the cache
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<K, V, C> CacheStore<K, V> for AccessAnalyzer<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync,
    C: CacheStore<K, V>,
{
    fn get(&self, key: &K) -> Option<V> {
        AccessAnalyzer::get(self, key)
    }

    fn set(&self, key: K, value: V) -> Option<K> {
        AccessAnalyzer::set(self, key, value)
    }

    fn has(&self, key: &K) -> bool {
        AccessAnalyzer::has(self, key)
    }

    fn delete(&self, key: &K) -> bool {
        AccessAnalyzer::delete(self, key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K, V, C: std::fmt::Debug> std::fmt::Debug for AccessAnalyzer<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessAnalyzer")
            .field("inner", &self.inner)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LruCache, LruConfig};

    fn analyzer(max_size: usize) -> AccessAnalyzer<String, u32, LruCache<String, u32>> {
        AccessAnalyzer::new(
            LruCache::new(LruConfig {
                max_size,
                sweep_interval: None,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_empty_stats() {
        let analyzer = analyzer(4);
        let stats = analyzer.stats();
        assert_eq!(stats, AccessStats::default());
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_hit_miss_tracking() {
        let analyzer = analyzer(4);
        analyzer.set(key("a"), 1);
        analyzer.get(&key("a"));
        analyzer.get(&key("a"));
        analyzer.get(&key("a"));
        analyzer.get(&key("missing"));

        let stats = analyzer.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.operations, 4);
        assert_eq!(stats.hit_rate, 0.75);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_has_and_delete_not_counted() {
        let analyzer = analyzer(4);
        analyzer.set(key("a"), 1);
        assert!(analyzer.has(&key("a")));
        assert!(analyzer.delete(&key("a")));
        assert_eq!(analyzer.stats().operations, 0);
        assert_eq!(analyzer.frequency(&key("a")), 1);
    }

    #[test]
    fn test_eviction_tracking() {
        let analyzer = analyzer(2);
        analyzer.set(key("a"), 1);
        analyzer.set(key("b"), 2);
        analyzer.set(key("c"), 3);
        analyzer.set(key("c"), 4);

        assert_eq!(analyzer.stats().evictions, 1);
    }

    #[test]
    fn test_hot_keys_by_frequency() {
        let analyzer = analyzer(8);
        for (k, n) in [("cold", 1), ("warm", 3), ("hot", 5)] {
            analyzer.set(key(k), 0);
            for _ in 1..n {
                analyzer.get(&key(k));
            }
        }

        assert_eq!(analyzer.hot_keys(2), vec![key("hot"), key("warm")]);
        assert_eq!(analyzer.hot_keys(10).len(), 3);
        assert_eq!(analyzer.frequency(&key("hot")), 5);
    }

    #[test]
    fn test_hot_keys_tie_break_first_accessed_first() {
        let analyzer = analyzer(8);
        for k in ["z", "m", "a", "q"] {
            analyzer.get(&key(k));
        }
        analyzer.get(&key("q"));

        assert_eq!(
            analyzer.hot_keys(4),
            vec![key("q"), key("z"), key("m"), key("a")]
        );
    }

    #[test]
    fn test_reset() {
        let analyzer = analyzer(2);
        analyzer.set(key("a"), 1);
        analyzer.get(&key("a"));
        analyzer.get(&key("b"));
        analyzer.reset();

        let stats = analyzer.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.operations, 0);
        assert!(analyzer.hot_keys(10).is_empty());
        // The cache contents survive a stats reset
        assert_eq!(stats.size, 1);
    }
}
