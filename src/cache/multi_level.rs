//! Multi-Level Cache - L1 (in-process) over L2 (shared store)
//!
//! Reads go L1 first, then L2; an L2 hit is decoded and promoted into L1.
//! Writes land in L1 unconditionally and are forwarded to L2 on a best-effort
//! basis: L2 failures and timeouts are logged and counted, never returned.
//!
//! The L1 lock is never held across an L2 await.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace, warn};

use super::entry::Ttl;
use super::l2::{JsonSerializer, L2Store, ValueSerializer};
use super::lru::{LruCache, LruConfig};
use crate::config::millis;
use crate::error::{Error, Result};

/// Default deadline for a single L2 call
pub const DEFAULT_L2_TIMEOUT: Duration = Duration::from_millis(100);

/// Multi-level cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiLevelConfig {
    /// L1 configuration
    pub l1: LruConfig,
    /// Prefix prepended to every L2 key
    pub l2_key_prefix: String,
    /// Deadline for each L2 call
    #[serde(with = "millis", rename = "l2_timeout_ms")]
    pub l2_timeout: Duration,
    /// TTL for L2 writes; `None` reuses the TTL of the L1 write
    pub l2_ttl: Option<Ttl>,
}

impl Default for MultiLevelConfig {
    fn default() -> Self {
        Self {
            l1: LruConfig::default(),
            l2_key_prefix: "cache:".to_string(),
            l2_timeout: DEFAULT_L2_TIMEOUT,
            l2_ttl: None,
        }
    }
}

impl MultiLevelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.l1.validate()?;
        if self.l2_timeout.is_zero() {
            return Err(Error::Config("l2_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Per-tier statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    /// Lookups served by L1
    pub l1_hits: u64,
    /// Lookups served by L2
    pub l2_hits: u64,
    /// Lookups found in neither tier
    pub misses: u64,
    /// L2 hits copied into L1
    pub promotions: u64,
    /// L2 failures, timeouts and undecodable payloads
    pub l2_errors: u64,
}

impl TierStats {
    /// Fraction of lookups served by either tier
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Two-tier cache keyed by string
pub struct MultiLevelCache<V, S = JsonSerializer<V>> {
    l1: LruCache<String, V>,
    l2: Option<Arc<dyn L2Store>>,
    serializer: S,
    config: MultiLevelConfig,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    l2_errors: AtomicU64,
}

impl<V> MultiLevelCache<V, JsonSerializer<V>>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a cache using JSON encoding for L2
    pub fn new(config: MultiLevelConfig, l2: Option<Arc<dyn L2Store>>) -> Result<Self> {
        Self::with_serializer(config, l2, JsonSerializer::new())
    }
}

impl<V, S> MultiLevelCache<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: ValueSerializer<V>,
{
    /// Create a cache with a custom L2 encoding
    pub fn with_serializer(
        config: MultiLevelConfig,
        l2: Option<Arc<dyn L2Store>>,
        serializer: S,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            l1: LruCache::new(config.l1.clone())?,
            l2,
            serializer,
            config,
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            l2_errors: AtomicU64::new(0),
        })
    }

    fn l2_key(&self, key: &str) -> String {
        format!("{}{}", self.config.l2_key_prefix, key)
    }

    /// Run one L2 call under the configured deadline
    async fn with_timeout<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.l2_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                after: self.config.l2_timeout,
            }),
        }
    }

    fn record_l2_error(&self, operation: &str, key: &str, err: &Error) {
        self.l2_errors.fetch_add(1, Ordering::Relaxed);
        warn!("L2 {} failed for key {}: {}", operation, key, err);
    }

    /// Look a key up in L1, then L2
    #[instrument(level = "trace", skip(self))]
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.l1.get(&key.to_string()) {
            self.l1_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        let Some(l2) = &self.l2 else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let l2_key = self.l2_key(key);
        let payload = match self.with_timeout("get", l2.get(&l2_key)).await {
            Ok(payload) => payload,
            Err(e) => {
                self.record_l2_error("get", key, &e);
                None
            }
        };

        let Some(bytes) = payload else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match self.serializer.deserialize(&bytes) {
            Ok(value) => {
                self.l2_hits.fetch_add(1, Ordering::Relaxed);
                // A write that landed in L1 during the L2 read wins
                let ttl = self.config.l1.default_ttl;
                if let Some(fresher) =
                    self.l1.set_if_absent(key.to_string(), value.clone(), ttl)
                {
                    trace!("Skipped promotion of {}; L1 was written meanwhile", key);
                    return Some(fresher);
                }
                self.promotions.fetch_add(1, Ordering::Relaxed);
                trace!("Promoted {} from L2 to L1", key);
                Some(value)
            }
            Err(e) => {
                self.record_l2_error("decode", key, &e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write through both tiers with the L1 default TTL
    pub async fn set(&self, key: &str, value: V) {
        let ttl = self.config.l1.default_ttl;
        self.set_with_ttl(key, value, ttl).await;
    }

    /// Write through both tiers with an explicit TTL
    #[instrument(level = "trace", skip(self, value))]
    pub async fn set_with_ttl(&self, key: &str, value: V, ttl: Ttl) {
        let encoded = self
            .l2
            .as_ref()
            .map(|l2| (Arc::clone(l2), self.serializer.serialize(&value)));

        self.l1.set_with_ttl(key.to_string(), value, ttl);

        let Some((l2, encoded)) = encoded else {
            return;
        };
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_l2_error("encode", key, &e);
                return;
            }
        };

        let l2_ttl = self.config.l2_ttl.unwrap_or(ttl);
        let l2_key = self.l2_key(key);
        if let Err(e) = self
            .with_timeout("set", l2.set(&l2_key, bytes, l2_ttl))
            .await
        {
            self.record_l2_error("set", key, &e);
        }
    }

    /// Check either tier for a live entry
    ///
    /// An L2 failure counts as absent for that tier.
    pub async fn has(&self, key: &str) -> bool {
        if self.l1.has(&key.to_string()) {
            return true;
        }
        let Some(l2) = &self.l2 else {
            return false;
        };
        match self.with_timeout("has", l2.has(&self.l2_key(key))).await {
            Ok(found) => found,
            Err(e) => {
                self.record_l2_error("has", key, &e);
                false
            }
        }
    }

    /// Remove from both tiers; true if either held the key
    pub async fn delete(&self, key: &str) -> bool {
        let in_l1 = self.l1.delete(&key.to_string());
        let Some(l2) = &self.l2 else {
            return in_l1;
        };
        let in_l2 = match self.with_timeout("delete", l2.delete(&self.l2_key(key))).await {
            Ok(removed) => removed,
            Err(e) => {
                self.record_l2_error("delete", key, &e);
                false
            }
        };
        in_l1 || in_l2
    }

    /// Empty L1; L2 is left untouched
    pub fn clear(&self) {
        self.l1.clear();
    }

    /// Stop the L1 sweeper and drop L1 contents
    pub fn dispose(&self) {
        self.l1.dispose();
    }

    /// The L1 tier
    pub fn l1(&self) -> &LruCache<String, V> {
        &self.l1
    }

    /// Whether an L2 tier is attached
    pub fn has_l2(&self) -> bool {
        self.l2.is_some()
    }

    /// Get configuration
    pub fn config(&self) -> &MultiLevelConfig {
        &self.config
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> TierStats {
        TierStats {
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            l2_errors: self.l2_errors.load(Ordering::Relaxed),
        }
    }
}

impl<V, S> std::fmt::Debug for MultiLevelCache<V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLevelCache")
            .field("l1", &self.l1)
            .field("has_l2", &self.l2.is_some())
            .field("l2_key_prefix", &self.config.l2_key_prefix)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
