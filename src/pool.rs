//! Object Pool
//!
//! Reusable instance allocator that amortizes construction cost.
//!
//! # Design
//!
//! - Free list under a single mutex; ownership moves to the caller on
//!   `acquire` and back on `release`
//! - Eager preallocation at construction absorbs initial bursts
//! - Adaptive sizing: every `window` acquisitions the observed miss rate is
//!   compared against a threshold and the preallocation target grows by
//!   `growth_step` (capped at `max_size`). This is a heuristic that makes
//!   misses tend to decrease, not a guarantee.
//! - Factory calls for top-ups run outside the free-list lock

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default maximum free-list size
pub const DEFAULT_POOL_MAX_SIZE: usize = 64;

/// Object pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of idle items kept in the free list
    pub max_size: usize,
    /// Items created eagerly at construction
    pub preallocate: usize,
    /// Enable adaptive growth of the preallocation target
    pub adaptive: bool,
    /// Acquisitions per observation window
    pub window: u64,
    /// Window miss rate above which the target grows (0.0 - 1.0)
    pub miss_rate_threshold: f64,
    /// Items added to the target per growth step
    pub growth_step: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            preallocate: 8,
            adaptive: true,
            window: 100,
            miss_rate_threshold: 0.2,
            growth_step: 4,
        }
    }
}

impl PoolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config("pool max_size must be at least 1".to_string()));
        }
        if self.preallocate > self.max_size {
            return Err(Error::Config(format!(
                "preallocate ({}) exceeds pool max_size ({})",
                self.preallocate, self.max_size
            )));
        }
        if self.window == 0 {
            return Err(Error::Config("pool window must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.miss_rate_threshold) {
            return Err(Error::Config(format!(
                "miss_rate_threshold must be within 0..=1, got {}",
                self.miss_rate_threshold
            )));
        }
        Ok(())
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    /// Total `acquire` calls
    pub acquires: u64,
    /// Items handed back through `release`, including those then discarded
    pub releases: u64,
    /// Acquisitions that had to call the factory
    pub misses: u64,
    /// Released items dropped because the free list was full
    pub discarded: u64,
    /// Items ever built by the factory
    pub created: u64,
    /// Idle items currently in the free list
    pub available: usize,
    /// Current preallocation target
    pub preallocate_target: usize,
}

impl PoolStats {
    /// Fraction of acquisitions that missed (0.0 when none yet)
    pub fn miss_rate(&self) -> f64 {
        if self.acquires == 0 {
            0.0
        } else {
            self.misses as f64 / self.acquires as f64
        }
    }
}

/// Free list plus the rolling window counters
struct PoolState<T> {
    free: Vec<T>,
    window_acquires: u64,
    window_misses: u64,
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Reset<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Pool of reusable `T` instances
pub struct ObjectPool<T> {
    state: Mutex<PoolState<T>>,
    factory: Factory<T>,
    reset: Reset<T>,
    config: PoolConfig,
    target: AtomicUsize,
    acquires: AtomicU64,
    releases: AtomicU64,
    misses: AtomicU64,
    discarded: AtomicU64,
    created: AtomicU64,
}

impl<T: Send> ObjectPool<T> {
    /// Create a pool and preallocate `config.preallocate` items
    pub fn new<F, R>(config: PoolConfig, factory: F, reset: R) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        config.validate()?;

        let free: Vec<T> = (0..config.preallocate).map(|_| factory()).collect();
        let created = free.len() as u64;

        Ok(Self {
            state: Mutex::new(PoolState {
                free,
                window_acquires: 0,
                window_misses: 0,
            }),
            factory: Box::new(factory),
            reset: Box::new(reset),
            target: AtomicUsize::new(config.preallocate),
            config,
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            created: AtomicU64::new(created),
        })
    }

    /// Take an item, building a fresh one if the free list is empty
    pub fn acquire(&self) -> T {
        self.acquires.fetch_add(1, Ordering::Relaxed);

        let (item, grow) = {
            let mut state = self.state.lock();
            let item = state.free.pop();
            state.window_acquires += 1;
            if item.is_none() {
                state.window_misses += 1;
            }
            let grow = self.end_window(&mut state);
            (item, grow)
        };

        let item = match item {
            Some(item) => item,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.build()
            }
        };

        if grow {
            self.replenish();
        }
        item
    }

    /// Take an item wrapped in a guard that releases it on drop
    pub fn acquire_scoped(&self) -> Pooled<'_, T> {
        Pooled {
            item: Some(self.acquire()),
            pool: self,
        }
    }

    /// Reset an item and return it to the free list
    ///
    /// Returns `false` when the item was dropped instead: either the free
    /// list is full, or more items are being released than were ever issued.
    pub fn release(&self, mut item: T) -> bool {
        // releases never outnumber acquires
        let issued = self.acquires.load(Ordering::Relaxed);
        let accepted = self
            .releases
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |released| {
                (released < issued).then_some(released + 1)
            })
            .is_ok();
        if !accepted {
            warn!("Release refused: more items released than acquired");
            return false;
        }

        (self.reset)(&mut item);

        let mut state = self.state.lock();
        if state.free.len() >= self.config.max_size {
            drop(state);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.free.push(item);
        true
    }

    /// Decide at the end of a window whether the target should grow
    fn end_window(&self, state: &mut PoolState<T>) -> bool {
        if !self.config.adaptive || state.window_acquires < self.config.window {
            return false;
        }

        let miss_rate = state.window_misses as f64 / state.window_acquires as f64;
        state.window_acquires = 0;
        state.window_misses = 0;

        let current = self.target.load(Ordering::Relaxed);
        if miss_rate <= self.config.miss_rate_threshold || current >= self.config.max_size {
            return false;
        }

        let next = (current + self.config.growth_step.max(1)).min(self.config.max_size);
        self.target.store(next, Ordering::Relaxed);
        debug!(
            miss_rate,
            from = current,
            to = next,
            "Pool preallocation target raised"
        );
        true
    }

    /// Top the free list up to the preallocation target
    fn replenish(&self) {
        let target = self.target.load(Ordering::Relaxed);
        let deficit = target.saturating_sub(self.state.lock().free.len());
        if deficit == 0 {
            return;
        }

        let fresh: Vec<T> = (0..deficit).map(|_| self.build()).collect();

        let mut state = self.state.lock();
        let room = self.config.max_size.saturating_sub(state.free.len());
        state.free.extend(fresh.into_iter().take(room));
    }

    fn build(&self) -> T {
        self.created.fetch_add(1, Ordering::Relaxed);
        (self.factory)()
    }

    /// Number of idle items
    pub fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Current preallocation target
    pub fn preallocate_target(&self) -> usize {
        self.target.load(Ordering::Relaxed)
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            available: self.available(),
            preallocate_target: self.preallocate_target(),
        }
    }

    /// Zero the acquire/release/miss/discard counters
    ///
    /// Outstanding items stay releasable only up to the new acquire count.
    pub fn reset_stats(&self) {
        self.acquires.store(0, Ordering::Relaxed);
        self.releases.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.discarded.store(0, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.window_acquires = 0;
        state.window_misses = 0;
    }

    /// Drop every idle item
    pub fn clear(&self) {
        self.state.lock().free.clear();
    }

    /// Get configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("config", &self.config)
            .field("target", &self.target.load(Ordering::Relaxed))
            .finish()
    }
}

/// Pool item that goes back to its pool when dropped
pub struct Pooled<'a, T: Send> {
    item: Option<T>,
    pool: &'a ObjectPool<T>,
}

impl<T: Send> Pooled<'_, T> {
    /// Keep the item instead of returning it to the pool
    ///
    /// The acquisition still counts as issued.
    pub fn detach(mut self) -> T {
        // item is only None after drop or detach
        self.item.take().expect("pooled item present until detach")
    }
}

impl<T: Send> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item present until drop")
    }
}

impl<T: Send> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item present until drop")
    }
}

impl<T: Send> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn buffer_pool(config: PoolConfig) -> ObjectPool<Vec<u8>> {
        ObjectPool::new(config, || Vec::with_capacity(16), |buf: &mut Vec<u8>| buf.clear())
            .unwrap()
    }

    fn fixed(max_size: usize, preallocate: usize) -> PoolConfig {
        PoolConfig {
            max_size,
            preallocate,
            adaptive: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_preallocation() {
        let pool = buffer_pool(fixed(10, 4));
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.stats().created, 4);

        pool.acquire();
        assert_eq!(pool.stats().misses, 0);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_invalid_config() {
        let result = ObjectPool::new(fixed(0, 0), || 0u32, |_| {});
        assert!(matches!(result, Err(Error::Config(_))));

        let result = ObjectPool::new(fixed(2, 3), || 0u32, |_| {});
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_release_resets_item() {
        let pool = buffer_pool(fixed(4, 0));

        let mut buf = pool.acquire();
        buf.extend_from_slice(b"dirty");
        assert!(pool.release(buf));

        let buf = pool.acquire();
        assert!(buf.is_empty(), "item should pass through reset");
        assert!(buf.capacity() >= 5, "allocation should be reused");
    }

    #[test]
    fn test_empty_pool_miss_uses_factory() {
        let pool = buffer_pool(fixed(4, 0));
        pool.acquire();
        pool.acquire();

        let stats = pool.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.miss_rate(), 1.0);
    }

    #[test]
    fn test_release_when_full_discards() {
        let pool = buffer_pool(fixed(1, 0));
        let a = pool.acquire();
        let b = pool.acquire();

        assert!(pool.release(a));
        assert!(!pool.release(b));
        assert_eq!(pool.available(), 1);
        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        // Discarded items still count as released
        assert_eq!(stats.releases, 2);
    }

    #[test]
    fn test_releases_never_exceed_acquires() {
        let pool = buffer_pool(fixed(8, 0));
        let item = pool.acquire();
        assert!(pool.release(item));

        // Foreign item: nothing outstanding
        assert!(!pool.release(Vec::new()));

        let stats = pool.stats();
        assert_eq!(stats.acquires, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn test_scoped_guard_releases_on_drop() {
        let pool = buffer_pool(fixed(4, 0));
        {
            let mut buf = pool.acquire_scoped();
            buf.push(1);
        }
        assert_eq!(pool.available(), 1);
        assert!(pool.acquire().is_empty());

        let kept = pool.acquire_scoped().detach();
        assert_eq!(kept.len(), 0);
        assert_eq!(pool.stats().releases, 1);
    }

    #[test]
    fn test_adaptive_growth_reduces_misses() {
        let pool = buffer_pool(PoolConfig {
            max_size: 32,
            preallocate: 0,
            adaptive: true,
            window: 10,
            miss_rate_threshold: 0.1,
            growth_step: 8,
        });

        // Bursts of 8 outstanding items, then everything comes back
        let mut first_window_misses = None;
        for round in 0..10 {
            let before = pool.stats().misses;
            let burst: Vec<_> = (0..8).map(|_| pool.acquire()).collect();
            for item in burst {
                pool.release(item);
            }
            let missed = pool.stats().misses - before;
            if round == 0 {
                first_window_misses = Some(missed);
            }
        }

        let stats = pool.stats();
        assert!(stats.preallocate_target > 0);
        assert!(stats.preallocate_target <= 32);
        assert!(stats.available <= 32);

        // Once warm, a burst is served entirely from the free list
        let before = stats.misses;
        let burst: Vec<_> = (0..8).map(|_| pool.acquire()).collect();
        assert_eq!(pool.stats().misses - before, 0);
        assert!(first_window_misses.unwrap() > 0);
        drop(burst);
    }

    #[test]
    fn test_target_capped_at_max_size() {
        let pool = buffer_pool(PoolConfig {
            max_size: 5,
            preallocate: 0,
            adaptive: true,
            window: 1,
            miss_rate_threshold: 0.0,
            growth_step: 100,
        });

        let items: Vec<_> = (0..20).map(|_| pool.acquire()).collect();
        assert_eq!(pool.preallocate_target(), 5);
        assert!(pool.available() <= 5);
        drop(items);
    }

    #[test]
    fn test_reset_stats() {
        let pool = buffer_pool(fixed(4, 0));
        let item = pool.acquire();
        pool.release(item);
        pool.reset_stats();

        let stats = pool.stats();
        assert_eq!(stats.acquires, 0);
        assert_eq!(stats.releases, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        use std::thread;

        let pool = Arc::new(buffer_pool(fixed(16, 4)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for i in 0..200u32 {
                        let mut buf = pool.acquire();
                        buf.push(i as u8);
                        pool.release(buf);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.acquires, 1600);
        assert!(stats.releases <= stats.acquires);
        assert!(stats.available <= 16);
    }
}
