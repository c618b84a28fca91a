//! Adaptive Cache - capacity tuned toward a target hit rate
//!
//! An [`AccessAnalyzer`] over an [`LruCache`], resized periodically:
//!
//! - hit rate below target: grow by `grow_factor` (at least one slot)
//! - hit rate above target + `shrink_margin`: shrink by `shrink_factor`
//! - otherwise: unchanged
//!
//! A resize builds a fresh LRU and migrates only the hottest keys that fit,
//! carrying their remaining TTL. Analyzer statistics restart after every
//! decision so each window is judged on its own traffic.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::analyzer::{AccessAnalyzer, AccessStats};
use super::entry::Ttl;
use super::lru::{LruCache, LruConfig};
use super::{CacheStore, DEFAULT_SWEEP_BATCH, DEFAULT_SWEEP_INTERVAL};
use crate::config::{millis, opt_millis};
use crate::error::{Error, Result};

/// Adaptive cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Capacity at construction
    pub initial_size: usize,
    /// Lower capacity bound
    pub min_size: usize,
    /// Upper capacity bound
    pub max_size: usize,
    /// Hit rate the tuner steers toward (0.0 - 1.0)
    pub target_hit_rate: f64,
    /// Hit rate must exceed target by this much before shrinking
    pub shrink_margin: f64,
    /// Multiplier applied on growth (> 1)
    pub grow_factor: f64,
    /// Multiplier applied on shrink (0 - 1, exclusive)
    pub shrink_factor: f64,
    /// Tuner period
    #[serde(with = "millis", rename = "adjust_interval_ms")]
    pub adjust_interval: Duration,
    /// Lookups required before a decision is taken
    pub min_operations: u64,
    /// TTL applied by `set`
    pub default_ttl: Ttl,
    /// Expiry sweep period of the underlying LRU
    #[serde(with = "opt_millis", rename = "sweep_interval_ms")]
    pub sweep_interval: Option<Duration>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            initial_size: 100,
            min_size: 10,
            max_size: 10_000,
            target_hit_rate: 0.8,
            shrink_margin: 0.1,
            grow_factor: 1.5,
            shrink_factor: 0.75,
            adjust_interval: Duration::from_secs(60),
            min_operations: 100,
            default_ttl: Ttl::Never,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl AdaptiveConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(Error::Config("min_size must be at least 1".to_string()));
        }
        if self.min_size > self.initial_size || self.initial_size > self.max_size {
            return Err(Error::Config(format!(
                "expected min_size <= initial_size <= max_size, got {} / {} / {}",
                self.min_size, self.initial_size, self.max_size
            )));
        }
        if !(0.0..=1.0).contains(&self.target_hit_rate) {
            return Err(Error::Config(format!(
                "target_hit_rate must be within 0..=1, got {}",
                self.target_hit_rate
            )));
        }
        if !(self.shrink_margin >= 0.0) {
            return Err(Error::Config("shrink_margin must be non-negative".to_string()));
        }
        if !(self.grow_factor > 1.0) {
            return Err(Error::Config(format!(
                "grow_factor must be greater than 1, got {}",
                self.grow_factor
            )));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(Error::Config(format!(
                "shrink_factor must be within (0, 1), got {}",
                self.shrink_factor
            )));
        }
        if self.adjust_interval.is_zero() {
            return Err(Error::Config("adjust_interval must be non-zero".to_string()));
        }
        Ok(())
    }

    fn lru_config(&self, max_size: usize) -> LruConfig {
        LruConfig {
            max_size,
            default_ttl: self.default_ttl,
            sweep_interval: self.sweep_interval,
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }
}

/// Outcome of one tuning step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptDecision {
    /// Capacity increased; `migrated` entries carried over
    Grew {
        from: usize,
        to: usize,
        migrated: usize,
    },
    /// Capacity decreased; `migrated` entries carried over
    Shrank {
        from: usize,
        to: usize,
        migrated: usize,
    },
    /// Hit rate within band, or already at the relevant bound
    Unchanged,
    /// Not enough lookups since the last decision
    Skipped,
}

impl std::fmt::Display for AdaptDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdaptDecision::Grew { from, to, .. } => write!(f, "grew {} -> {}", from, to),
            AdaptDecision::Shrank { from, to, .. } => write!(f, "shrank {} -> {}", from, to),
            AdaptDecision::Unchanged => write!(f, "unchanged"),
            AdaptDecision::Skipped => write!(f, "skipped"),
        }
    }
}

type Tracked<K, V> = AccessAnalyzer<K, V, LruCache<K, V>>;

/// Handle to the background tuner task
struct Tuner {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Self-resizing LRU cache
pub struct AdaptiveCache<K, V> {
    /// Readers share the lock; a resize takes it exclusively to swap caches
    current: RwLock<Tracked<K, V>>,
    config: AdaptiveConfig,
    resizes: AtomicU64,
    tuner: Mutex<Option<Tuner>>,
    disposed: AtomicBool,
}

impl<K, V> AdaptiveCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache at `initial_size`; call [`start`](Self::start) to tune
    /// automatically, or drive [`adapt`](Self::adapt) yourself
    pub fn new(config: AdaptiveConfig) -> Result<Self> {
        config.validate()?;
        let lru = LruCache::new(config.lru_config(config.initial_size))?;
        Ok(Self {
            current: RwLock::new(AccessAnalyzer::new(lru)),
            config,
            resizes: AtomicU64::new(0),
            tuner: Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    /// Get a value, recording a hit or miss
    pub fn get(&self, key: &K) -> Option<V> {
        self.current.read().get(key)
    }

    /// Insert with the configured default TTL
    pub fn set(&self, key: K, value: V) -> Option<K> {
        self.current.read().set(key, value)
    }

    /// Existence check (not counted)
    pub fn has(&self, key: &K) -> bool {
        self.current.read().has(key)
    }

    /// Delete (not counted)
    pub fn delete(&self, key: &K) -> bool {
        self.current.read().delete(key)
    }

    /// Resident entry count
    pub fn len(&self) -> usize {
        self.current.read().inner().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity
    pub fn capacity(&self) -> usize {
        self.current.read().inner().capacity()
    }

    /// Statistics for the current window
    pub fn stats(&self) -> AccessStats {
        self.current.read().stats()
    }

    /// Most accessed keys in the current window
    pub fn hot_keys(&self, limit: usize) -> Vec<K> {
        self.current.read().hot_keys(limit)
    }

    /// Number of resizes performed so far
    pub fn resizes(&self) -> u64 {
        self.resizes.load(Ordering::Relaxed)
    }

    /// Get configuration
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Take one tuning decision and apply it
    ///
    /// Fails once the cache is disposed, so no replacement cache (and sweeper)
    /// is built after shutdown.
    pub fn adapt(&self) -> Result<AdaptDecision> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Runtime("adaptive cache is disposed".to_string()));
        }
        let mut current = self.current.write();
        let stats = current.stats();
        if stats.operations < self.config.min_operations {
            return Ok(AdaptDecision::Skipped);
        }

        let capacity = current.inner().capacity();
        let target = self.config.target_hit_rate;

        let next = if stats.hit_rate < target && capacity < self.config.max_size {
            let grown = (capacity as f64 * self.config.grow_factor).ceil() as usize;
            Some(grown.max(capacity + 1).min(self.config.max_size))
        } else if stats.hit_rate > target + self.config.shrink_margin
            && capacity > self.config.min_size
        {
            let shrunk = (capacity as f64 * self.config.shrink_factor).floor() as usize;
            Some(shrunk.min(capacity - 1).max(self.config.min_size))
        } else {
            None
        };

        let Some(new_capacity) = next else {
            current.reset();
            debug!(
                "Adaptive cache unchanged at {} (hit rate {:.3})",
                capacity, stats.hit_rate
            );
            return Ok(AdaptDecision::Unchanged);
        };

        let (resized, migrated) = self.rebuild(&current, new_capacity)?;
        *current = resized;
        self.resizes.fetch_add(1, Ordering::Relaxed);

        let decision = if new_capacity > capacity {
            AdaptDecision::Grew {
                from: capacity,
                to: new_capacity,
                migrated,
            }
        } else {
            AdaptDecision::Shrank {
                from: capacity,
                to: new_capacity,
                migrated,
            }
        };
        info!(
            "Adaptive cache {} (hit rate {:.3}, {} entries migrated)",
            decision, stats.hit_rate, migrated
        );
        Ok(decision)
    }

    /// Fresh LRU holding the hottest live entries that fit
    fn rebuild(&self, current: &Tracked<K, V>, capacity: usize) -> Result<(Tracked<K, V>, usize)> {
        let lru = LruCache::new(self.config.lru_config(capacity))?;

        let hot: Vec<(K, V, Ttl)> = current
            .hot_keys(usize::MAX)
            .into_iter()
            .filter_map(|key| {
                let (value, ttl) = current.inner().peek_with_ttl(&key)?;
                Some((key, value, ttl))
            })
            .take(capacity)
            .collect();

        // Coldest first so the hottest key ends up most recently used
        let migrated = hot.len();
        for (key, value, ttl) in hot.into_iter().rev() {
            lru.set_with_ttl(key, value, ttl);
        }
        Ok((AccessAnalyzer::new(lru), migrated))
    }

    /// Spawn the tuner on the current tokio runtime
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped or disposed. Calling `start` twice is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Runtime("adaptive cache is disposed".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("adaptive tuner needs a tokio runtime: {}", e)))?;

        let mut tuner = self.tuner.lock();
        if tuner.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.adjust_interval;

        let handle = runtime.spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tick.tick() => {
                        let Some(cache) = cache.upgrade() else {
                            break;
                        };
                        if let Err(e) = cache.adapt() {
                            tracing::error!("Adaptive resize failed: {}", e);
                        }
                    }
                }
            }
            debug!("Adaptive tuner stopped");
        });

        *tuner = Some(Tuner { token, handle });
        info!("Adaptive tuner started (interval {:?})", period);
        Ok(())
    }

    /// Whether the tuner task is running
    pub fn is_tuning(&self) -> bool {
        self.tuner
            .lock()
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the tuner and the underlying sweeper, releasing all entries
    ///
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tuner) = self.tuner.lock().take() {
            tuner.token.cancel();
        }
        self.current.read().inner().dispose();
        debug!("Adaptive cache disposed");
    }
}

impl<K, V> Drop for AdaptiveCache<K, V> {
    fn drop(&mut self) {
        if let Some(tuner) = self.tuner.get_mut().take() {
            tuner.token.cancel();
        }
    }
}

impl<K, V> std::fmt::Debug for AdaptiveCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveCache")
            .field("min_size", &self.config.min_size)
            .field("max_size", &self.config.max_size)
            .field("target_hit_rate", &self.config.target_hit_rate)
            .field("resizes", &self.resizes.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V> CacheStore<K, V> for AdaptiveCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        AdaptiveCache::get(self, key)
    }

    fn set(&self, key: K, value: V) -> Option<K> {
        AdaptiveCache::set(self, key, value)
    }

    fn has(&self, key: &K) -> bool {
        AdaptiveCache::has(self, key)
    }

    fn delete(&self, key: &K) -> bool {
        AdaptiveCache::delete(self, key)
    }

    fn len(&self) -> usize {
        AdaptiveCache::len(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
