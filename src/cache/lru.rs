//! LRU Cache - O(1) recency cache with per-entry TTL
//!
//! # Design
//!
//! - Slab-backed recency list (head = MRU, tail = LRU) linked by slot index
//! - `HashMap<K, SlotId>` lookup table for O(1) access
//! - `BTreeSet<(Instant, SlotId)>` expiry index so sweeps cost O(expired)
//! - List, lookup table and expiry index mutate together under one mutex
//! - Optional tokio sweeper that holds only a `Weak` handle to the state
//!
//! Capacity eviction happens *before* a new key is linked, so the resident
//! entry count never exceeds `max_size`.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::entry::{Entry, SlotId, Ttl};
use super::list::RecencyList;
use super::{CacheStore, DEFAULT_MAX_SIZE, DEFAULT_SWEEP_BATCH, DEFAULT_SWEEP_INTERVAL};
use crate::config::opt_millis;
use crate::error::{Error, Result};

/// LRU cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LruConfig {
    /// Maximum number of resident entries (must be >= 1)
    pub max_size: usize,
    /// TTL applied by `set` when no explicit TTL is given
    pub default_ttl: Ttl,
    /// Background sweep period, `None` disables the sweeper
    #[serde(with = "opt_millis", rename = "sweep_interval_ms")]
    pub sweep_interval: Option<Duration>,
    /// Maximum expired entries removed per lock hold during a sweep
    pub sweep_batch: usize,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl: Ttl::Never,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }
}

impl LruConfig {
    /// Config with the given capacity and defaults elsewhere
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config("max_size must be at least 1".to_string()));
        }
        if self.sweep_batch == 0 {
            return Err(Error::Config("sweep_batch must be at least 1".to_string()));
        }
        if self.sweep_interval == Some(Duration::ZERO) {
            return Err(Error::Config(
                "sweep_interval must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// List, lookup table and expiry index, always mutated together
struct LruState<K, V> {
    list: RecencyList<K, V>,
    index: HashMap<K, SlotId>,
    expiry: BTreeSet<(Instant, SlotId)>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> LruState<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            list: RecencyList::with_capacity(capacity.min(4096)),
            index: HashMap::with_capacity(capacity.min(4096)),
            expiry: BTreeSet::new(),
            capacity,
        }
    }

    /// Unlink a slot from all three structures
    fn remove_slot(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        let entry = self.list.remove(id)?;
        self.index.remove(&entry.key);
        if let Some(at) = entry.expires_at {
            self.expiry.remove(&(at, id));
        }
        Some(entry)
    }

    /// Returns the evicted key when a capacity eviction happened
    fn insert(&mut self, key: K, value: V, deadline: Option<Instant>) -> Option<K> {
        if let Some(&id) = self.index.get(&key) {
            let old_deadline = self.list.get(id).and_then(|e| e.expires_at);
            if let Some(at) = old_deadline {
                self.expiry.remove(&(at, id));
            }
            if let Some(entry) = self.list.get_mut(id) {
                entry.value = value;
                entry.expires_at = deadline;
            }
            if let Some(at) = deadline {
                self.expiry.insert((at, id));
            }
            self.list.move_to_front(id);
            return None;
        }

        let mut evicted = None;
        if self.list.len() >= self.capacity {
            if let Some(tail) = self.list.back() {
                evicted = self.remove_slot(tail).map(|e| e.key);
            }
        }

        let id = self.list.push_front(Entry::new(key.clone(), value, deadline));
        self.index.insert(key, id);
        if let Some(at) = deadline {
            self.expiry.insert((at, id));
        }
        evicted
    }

    /// Live slot for `key`, removing it first if it has expired
    fn live_slot(&mut self, key: &K, now: Instant) -> Option<SlotId> {
        let id = *self.index.get(key)?;
        let expired = self
            .list
            .get(id)
            .map(|e| e.is_expired_at(now))
            .unwrap_or(true);
        if expired {
            self.remove_slot(id);
            return None;
        }
        Some(id)
    }

    /// Remove up to `limit` expired entries, oldest deadline first
    fn purge(&mut self, now: Instant, limit: usize) -> usize {
        let due: Vec<SlotId> = self
            .expiry
            .iter()
            .take_while(|(at, _)| *at <= now)
            .take(limit)
            .map(|(_, id)| *id)
            .collect();
        for id in &due {
            self.remove_slot(*id);
        }
        due.len()
    }
}

/// Sweep `state` in bounded batches so no single lock hold scales with input
fn purge_in_batches<K, V>(state: &Mutex<LruState<K, V>>, batch: usize) -> usize
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    let mut total = 0;
    loop {
        let removed = state.lock().purge(Instant::now(), batch);
        total += removed;
        if removed < batch {
            return total;
        }
    }
}

/// Handle to the background sweeper task
struct Sweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Thread-safe LRU cache with per-entry TTL
pub struct LruCache<K, V> {
    state: Arc<Mutex<LruState<K, V>>>,
    config: LruConfig,
    sweeper: Mutex<Option<Sweeper>>,
    disposed: AtomicBool,
    evictions: AtomicU64,
    expirations: Arc<AtomicU64>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a cache holding at most `max_size` entries
    pub fn with_capacity(max_size: usize) -> Result<Self> {
        Self::new(LruConfig::with_max_size(max_size))
    }

    /// Create a cache from a full configuration
    ///
    /// When `sweep_interval` is set and a tokio runtime is running, a sweeper
    /// task is spawned on it. Without a runtime expired entries are still
    /// dropped lazily on access.
    pub fn new(config: LruConfig) -> Result<Self> {
        config.validate()?;

        let state = Arc::new(Mutex::new(LruState::new(config.max_size)));
        let expirations = Arc::new(AtomicU64::new(0));

        let sweeper = match config.sweep_interval {
            Some(interval) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => Some(Self::spawn_sweeper(
                    &runtime,
                    Arc::downgrade(&state),
                    Arc::clone(&expirations),
                    interval,
                    config.sweep_batch,
                )),
                Err(_) => {
                    debug!("No tokio runtime, LRU sweeper disabled");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            state,
            config,
            sweeper: Mutex::new(sweeper),
            disposed: AtomicBool::new(false),
            evictions: AtomicU64::new(0),
            expirations,
        })
    }

    fn spawn_sweeper(
        runtime: &tokio::runtime::Handle,
        state: Weak<Mutex<LruState<K, V>>>,
        expirations: Arc<AtomicU64>,
        interval: Duration,
        batch: usize,
    ) -> Sweeper {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = runtime.spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tick.tick() => {
                        let Some(state) = state.upgrade() else {
                            break;
                        };
                        let removed = purge_in_batches(&state, batch);
                        if removed > 0 {
                            expirations.fetch_add(removed as u64, Ordering::Relaxed);
                            debug!(removed, "Swept expired cache entries");
                        }
                    }
                }
            }
            trace!("LRU sweeper stopped");
        });

        Sweeper { token, handle }
    }

    /// Insert or update using the configured default TTL
    ///
    /// Returns the key evicted to make room, if any.
    pub fn set(&self, key: K, value: V) -> Option<K> {
        self.set_with_ttl(key, value, self.config.default_ttl)
    }

    /// Insert or update with an explicit TTL
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Ttl) -> Option<K> {
        let deadline = ttl.deadline(Instant::now());
        let evicted = self.state.lock().insert(key, value, deadline);
        if evicted.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!("Evicted least recently used entry");
        }
        evicted
    }

    /// Insert only when no live entry exists, under a single lock hold
    ///
    /// Returns the resident value when one was already present, leaving it
    /// untouched apart from refreshing its recency.
    pub fn set_if_absent(&self, key: K, value: V, ttl: Ttl) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();
        if let Some(id) = state.live_slot(&key, now) {
            state.list.move_to_front(id);
            return state.list.get(id).map(|e| e.value.clone());
        }
        if state.insert(key, value, ttl.deadline(now)).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!("Evicted least recently used entry");
        }
        None
    }

    /// Get a value, refreshing its recency
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        let id = state.live_slot(key, Instant::now())?;
        state.list.move_to_front(id);
        state.list.get(id).map(|e| e.value.clone())
    }

    /// Get a value without touching recency
    pub fn peek(&self, key: &K) -> Option<V> {
        self.peek_with_ttl(key).map(|(value, _)| value)
    }

    /// Get a value and its remaining TTL without touching recency
    pub fn peek_with_ttl(&self, key: &K) -> Option<(V, Ttl)> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let id = state.live_slot(key, now)?;
        state
            .list
            .get(id)
            .map(|e| (e.value.clone(), Ttl::remaining(e.expires_at, now)))
    }

    /// Check for a live entry without touching recency
    pub fn has(&self, key: &K) -> bool {
        self.state.lock().live_slot(key, Instant::now()).is_some()
    }

    /// Remove an entry, returning whether one was present
    pub fn delete(&self, key: &K) -> bool {
        let mut state = self.state.lock();
        match state.index.get(key).copied() {
            Some(id) => state.remove_slot(id).is_some(),
            None => false,
        }
    }

    /// Remove all entries
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.list.clear();
        state.index.clear();
        state.expiry.clear();
    }

    /// Number of resident entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.state.lock().list.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.config.max_size
    }

    /// Live keys, most recently used first
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .list
            .iter()
            .filter(|(_, e)| !e.is_expired_at(now))
            .map(|(_, e)| e.key.clone())
            .collect()
    }

    /// Remove every expired entry now
    pub fn purge_expired(&self) -> usize {
        let removed = purge_in_batches(&self.state, self.config.sweep_batch);
        self.expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Number of capacity evictions so far
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Number of entries removed by sweeps so far
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Whether a background sweeper is currently attached
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false)
    }

    /// Get configuration
    pub fn config(&self) -> &LruConfig {
        &self.config
    }

    /// Stop the sweeper and release all entries
    ///
    /// Idempotent. The cache remains usable afterwards but no longer sweeps.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.token.cancel();
        }
        self.clear();
        debug!("LRU cache disposed");
    }

    /// Check the list/index/expiry invariants
    #[cfg(test)]
    pub(crate) fn validate_invariants(&self) {
        let state = self.state.lock();
        state.list.debug_validate_invariants();
        assert_eq!(state.index.len(), state.list.len());
        assert!(state.list.len() <= state.capacity);
        for (id, entry) in state.list.iter() {
            assert_eq!(state.index.get(&entry.key), Some(&id));
            if let Some(at) = entry.expires_at {
                assert!(state.expiry.contains(&(at, id)));
            }
        }
        assert_eq!(
            state.expiry.len(),
            state
                .list
                .iter()
                .filter(|(_, e)| e.expires_at.is_some())
                .count()
        );
    }
}

impl<K, V> Drop for LruCache<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.token.cancel();
        }
    }
}

impl<K, V> std::fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("max_size", &self.config.max_size)
            .field("default_ttl", &self.config.default_ttl)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V> CacheStore<K, V> for LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        LruCache::get(self, key)
    }

    fn set(&self, key: K, value: V) -> Option<K> {
        LruCache::set(self, key, value)
    }

    fn has(&self, key: &K) -> bool {
        LruCache::has(self, key)
    }

    fn delete(&self, key: &K) -> bool {
        LruCache::delete(self, key)
    }

    fn len(&self) -> usize {
        LruCache::len(self)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn cache(max_size: usize) -> LruCache<&'static str, u32> {
        LruCache::new(LruConfig {
            max_size,
            sweep_interval: None,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = LruCache::<String, u32>::with_capacity(0);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_set_then_get() {
        let cache = cache(4);
        assert_eq!(cache.set("a", 1), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.len(), 1);
        cache.validate_invariants();
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = cache(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.set("c", 3), Some("a"));

        assert!(!cache.has(&"a"));
        assert!(cache.has(&"b"));
        assert!(cache.has(&"c"));
        assert_eq!(cache.evictions(), 1);
        cache.validate_invariants();
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = cache(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.get(&"a");
        assert_eq!(cache.set("c", 3), Some("b"));

        assert!(cache.has(&"a"));
        assert!(!cache.has(&"b"));
        assert!(cache.has(&"c"));
    }

    #[test]
    fn test_has_does_not_refresh_recency() {
        let cache = cache(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert!(cache.has(&"a"));
        assert_eq!(cache.set("c", 3), Some("a"));
    }

    #[test]
    fn test_update_existing_moves_to_head_without_eviction() {
        let cache = cache(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.set("a", 10), None);
        assert_eq!(cache.keys(), vec!["a", "b"]);
        assert_eq!(cache.peek(&"a"), Some(10));
        cache.validate_invariants();
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = cache(4);
        cache.set_with_ttl("k", 1, Ttl::Millis(10));
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.get(&"k"), None);
        assert!(!cache.has(&"k"));
        cache.validate_invariants();
    }

    #[test]
    fn test_zero_ttl_is_immediate_miss() {
        let cache = cache(4);
        cache.set_with_ttl("k", 1, Ttl::Millis(0));
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_default_ttl_applies() {
        let cache: LruCache<&str, u32> = LruCache::new(LruConfig {
            max_size: 4,
            default_ttl: Ttl::Millis(10),
            sweep_interval: None,
            ..Default::default()
        })
        .unwrap();
        cache.set("k", 1);
        cache.set_with_ttl("forever", 2, Ttl::Never);
        std::thread::sleep(Duration::from_millis(20));

        assert!(!cache.has(&"k"));
        assert!(cache.has(&"forever"));
    }

    #[test]
    fn test_update_replaces_ttl() {
        let cache = cache(4);
        cache.set_with_ttl("k", 1, Ttl::Millis(10));
        cache.set_with_ttl("k", 2, Ttl::Never);
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.get(&"k"), Some(2));
        cache.validate_invariants();
    }

    #[test]
    fn test_peek_with_ttl_reports_remaining() {
        let cache = cache(4);
        cache.set_with_ttl("k", 1, Ttl::Millis(60_000));
        let (value, ttl) = cache.peek_with_ttl(&"k").unwrap();
        assert_eq!(value, 1);
        match ttl {
            Ttl::Millis(ms) => assert!(ms <= 60_000 && ms > 59_000),
            Ttl::Never => panic!("expected a finite ttl"),
        }
    }

    #[test]
    fn test_delete() {
        let cache = cache(4);
        cache.set("a", 1);
        assert!(cache.delete(&"a"));
        assert!(!cache.delete(&"a"));
        assert!(cache.is_empty());
        cache.validate_invariants();
    }

    #[test]
    fn test_clear_and_keys() {
        let cache = cache(4);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.keys(), vec!["c", "b", "a"]);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
        cache.validate_invariants();
    }

    #[test]
    fn test_purge_expired_reclaims_untouched_entries() {
        let cache: LruCache<u32, u32> = LruCache::new(LruConfig {
            max_size: 100,
            sweep_interval: None,
            sweep_batch: 3,
            ..Default::default()
        })
        .unwrap();
        for i in 0..10 {
            cache.set_with_ttl(i, i, Ttl::Millis(5));
        }
        cache.set(100, 100);
        std::thread::sleep(Duration::from_millis(15));

        assert_eq!(cache.len(), 11);
        assert_eq!(cache.purge_expired(), 10);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.expirations(), 10);
        cache.validate_invariants();
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let cache = cache(4);
        cache.set("a", 1);
        cache.dispose();
        cache.dispose();
        assert!(cache.is_empty());
        assert!(!cache.is_sweeping());
    }

    #[test]
    fn test_no_runtime_means_no_sweeper() {
        let cache: LruCache<u32, u32> = LruCache::new(LruConfig::default()).unwrap();
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_background_sweep_removes_expired() {
        let cache: LruCache<u32, u32> = LruCache::new(LruConfig {
            max_size: 16,
            sweep_interval: Some(Duration::from_millis(10)),
            ..Default::default()
        })
        .unwrap();
        assert!(cache.is_sweeping());

        cache.set_with_ttl(1, 1, Ttl::Millis(5));
        cache.set(2, 2);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.expirations() >= 1);
        cache.dispose();
    }

    #[tokio::test]
    async fn test_dispose_stops_sweeper() {
        let cache: LruCache<u32, u32> = LruCache::new(LruConfig {
            max_size: 16,
            sweep_interval: Some(Duration::from_millis(5)),
            ..Default::default()
        })
        .unwrap();
        cache.dispose();
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.set_with_ttl(1, 1, Ttl::Millis(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Nothing swept it; it is only dropped lazily
        assert_eq!(cache.len(), 1);
        assert!(!cache.has(&1));
    }

    #[test]
    fn test_concurrent_access_respects_capacity() {
        use std::thread;

        let cache: Arc<LruCache<String, usize>> = Arc::new(
            LruCache::new(LruConfig {
                max_size: 64,
                sweep_interval: None,
                ..Default::default()
            })
            .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("k-{}-{}", t, i % 100);
                        cache.set(key.clone(), i);
                        cache.get(&key);
                        assert!(cache.len() <= 64);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 64);
        cache.validate_invariants();
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use super::tests::cache;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8, u16),
        Get(u8),
        Has(u8),
        Delete(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..32, any::<u16>()).prop_map(|(k, v)| Op::Set(k, v)),
            (0u8..32).prop_map(Op::Get),
            (0u8..32).prop_map(Op::Has),
            (0u8..32).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: size never exceeds capacity and the list stays consistent.
        #[test]
        fn prop_capacity_and_links_hold(
            capacity in 1usize..8,
            ops in prop::collection::vec(op_strategy(), 1..200),
        ) {
            let cache: LruCache<u8, u16> = LruCache::new(LruConfig {
                max_size: capacity,
                sweep_interval: None,
                ..Default::default()
            }).unwrap();

            for op in ops {
                match op {
                    Op::Set(k, v) => {
                        cache.set(k, v);
                        prop_assert_eq!(cache.peek(&k), Some(v));
                    }
                    Op::Get(k) => { cache.get(&k); }
                    Op::Has(k) => { cache.has(&k); }
                    Op::Delete(k) => {
                        cache.delete(&k);
                        prop_assert!(!cache.has(&k));
                    }
                }
                prop_assert!(cache.len() <= capacity);
            }
            cache.validate_invariants();
        }
    }

    #[test]
    fn test_set_if_absent_keeps_live_entry() {
        let cache = cache(2);
        assert_eq!(cache.set_if_absent("a", 1, Ttl::Never), None);
        assert_eq!(cache.set_if_absent("a", 9, Ttl::Never), Some(1));
        assert_eq!(cache.get(&"a"), Some(1));

        cache.set_with_ttl("b", 2, Ttl::Millis(0));
        assert_eq!(cache.set_if_absent("b", 3, Ttl::Never), None);
        assert_eq!(cache.get(&"b"), Some(3));

        assert_eq!(cache.set_if_absent("c", 4, Ttl::Never), None);
        assert_eq!(cache.evictions(), 1);
        cache.validate_invariants();
    }
}
