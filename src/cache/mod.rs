//! Cache Engine
//!
//! LRU cache with per-entry TTL plus the compositions built on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  CacheWarmer ──────────────► any CacheStore                              │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  AdaptiveCache                      │  MultiLevelCache                   │
//! │  ┌──────────────┐ ┌─────────────┐   │  ┌──────────────┐ ┌─────────────┐  │
//! │  │ AccessAnalyzer│►│  LruCache   │   │  │ L1: LruCache │ │ L2: L2Store │  │
//! │  └──────────────┘ └─────────────┘   │  └──────────────┘ └─────────────┘  │
//! │      resize toward target hit rate  │  promotion on L2 hit (write-back)  │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  LruCache: RecencyList (slab) + key index + expiry index, one mutex      │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Complexity
//!
//! - get / set / has / delete: O(1)
//! - keys / clear: O(n)
//! - expiry sweep: O(expired · log n), in bounded batches

use std::time::Duration;

mod adaptive;
mod analyzer;
mod entry;
mod l2;
mod list;
mod lru;
mod multi_level;
mod warmer;

pub use adaptive::{AdaptDecision, AdaptiveCache, AdaptiveConfig};
pub use analyzer::{AccessAnalyzer, AccessStats};
pub use entry::{Entry, SlotId, Ttl};
pub use l2::{InMemoryL2Store, JsonSerializer, L2Store, L2StoreStats, ValueSerializer};
pub use list::RecencyList;
pub use lru::{LruCache, LruConfig};
pub use multi_level::{MultiLevelCache, MultiLevelConfig, TierStats};
pub use warmer::{CacheWarmer, WarmerConfig, WarmupFailure, WarmupReport};

/// Default LRU capacity (entries)
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default background sweep period
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of expired entries removed per lock hold
pub const DEFAULT_SWEEP_BATCH: usize = 256;

/// Minimal synchronous cache contract
///
/// Implemented by [`LruCache`], [`AccessAnalyzer`] and [`AdaptiveCache`];
/// consumed by the analyzer and the [`CacheWarmer`].
pub trait CacheStore<K, V>: Send + Sync {
    /// Get a value; `None` is a miss
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or update; returns the key evicted for capacity, if any
    fn set(&self, key: K, value: V) -> Option<K>;

    /// Existence check honoring TTL
    fn has(&self, key: &K) -> bool;

    /// Remove; returns whether an entry was present
    fn delete(&self, key: &K) -> bool;

    /// Resident entry count
    fn len(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
