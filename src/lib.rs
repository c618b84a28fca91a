//! statecache - In-Process Caching and Object Pooling
//!
//! Building blocks for keeping hot state in memory: a recency cache with
//! per-entry expiry, compositions that tune or tier it, and an allocator
//! for reusable objects.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  CacheWarmer         AdaptiveCache            MultiLevelCache     │
//! │  (loaders → cache)   (analyzer + resize)      (L1 LRU + L2 store) │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                 LruCache (recency + TTL + sweep)                  │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  hash (structural keys)               pool (reusable instances)   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`] - LRU, access analyzer, adaptive, multi-level and warmer
//! - [`config`] - YAML configuration for every component
//! - [`error`] - Error types
//! - [`hash`] - Structural hashing of values into cache keys
//! - [`metrics`] - Prometheus export of component statistics
//! - [`pool`] - Object pool with adaptive preallocation

pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod pool;

// Re-export commonly used types
pub use cache::{
    AccessAnalyzer, AccessStats, AdaptDecision, AdaptiveCache, AdaptiveConfig, CacheStore,
    CacheWarmer, InMemoryL2Store, L2Store, LruCache, LruConfig, MultiLevelCache,
    MultiLevelConfig, Ttl, WarmupReport,
};
pub use config::StateCacheConfig;
pub use error::{Error, Result};
pub use metrics::CacheMetricsExporter;
pub use pool::{ObjectPool, PoolConfig, PoolStats, Pooled};
