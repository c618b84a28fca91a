//! L2 Store - Secondary Cache Tier
//!
//! Asynchronous byte store sitting behind the in-process L1 cache.
//!
//! # Design
//!
//! - Pluggable backend trait (remote key-value store, disk, ...)
//! - Values cross the boundary as `Bytes`, encoded by a [`ValueSerializer`]
//! - [`InMemoryL2Store`] for tests and single-process deployments

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::entry::Ttl;
use crate::error::Result;

/// Secondary storage tier
#[async_trait]
pub trait L2Store: Send + Sync {
    /// Fetch the payload stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a payload with a TTL
    async fn set(&self, key: &str, value: Bytes, ttl: Ttl) -> Result<()>;

    /// Remove a payload, returning whether one was present
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check if a live payload exists
    async fn has(&self, key: &str) -> Result<bool>;
}

/// Converts values to and from the L2 wire form
pub trait ValueSerializer<V>: Send + Sync {
    /// Encode a value
    fn serialize(&self, value: &V) -> Result<Bytes>;

    /// Decode a value
    fn deserialize(&self, bytes: &[u8]) -> Result<V>;
}

/// JSON encoding via serde_json
pub struct JsonSerializer<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonSerializer<V> {
    /// Create a serializer
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Default for JsonSerializer<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for JsonSerializer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonSerializer")
    }
}

impl<V> ValueSerializer<V> for JsonSerializer<V>
where
    V: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &V) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<V> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// In-memory store statistics
#[derive(Debug, Clone, Default)]
pub struct L2StoreStats {
    /// Payloads currently stored (expired ones included until touched)
    pub object_count: u64,
    /// Total payload bytes stored
    pub total_bytes: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
    /// Payloads dropped on access because their TTL passed
    pub expired: u64,
}

#[derive(Debug, Clone)]
struct StoredPayload {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl StoredPayload {
    fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// In-memory L2 store
///
/// DashMap-sharded so concurrent tiers do not contend on one lock.
/// Expired payloads are dropped when touched.
#[derive(Debug, Default)]
pub struct InMemoryL2Store {
    storage: DashMap<String, StoredPayload>,
    object_count: AtomicU64,
    total_bytes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    expired: AtomicU64,
}

impl InMemoryL2Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get statistics
    pub fn stats(&self) -> L2StoreStats {
        L2StoreStats {
            object_count: self.object_count.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }

    /// Number of stored payloads
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    fn account_removed(&self, payload: &StoredPayload) {
        self.object_count.fetch_sub(1, Ordering::Relaxed);
        self.total_bytes
            .fetch_sub(payload.data.len() as u64, Ordering::Relaxed);
    }

    /// Live payload for `key`, dropping it if expired
    fn live(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let expired = match self.storage.get(key) {
            Some(payload) if !payload.is_expired_at(now) => return Some(payload.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            if let Some((_, payload)) = self
                .storage
                .remove_if(key, |_, payload| payload.is_expired_at(now))
            {
                self.account_removed(&payload);
                self.expired.fetch_add(1, Ordering::Relaxed);
            }
        }
        None
    }
}

#[async_trait]
impl L2Store for InMemoryL2Store {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.live(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Ttl) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let size = value.len() as u64;
        let payload = StoredPayload {
            data: value,
            expires_at: ttl.deadline(Instant::now()),
        };

        match self.storage.insert(key.to_string(), payload) {
            Some(old) => {
                let old_size = old.data.len() as u64;
                if size > old_size {
                    self.total_bytes
                        .fetch_add(size - old_size, Ordering::Relaxed);
                } else {
                    self.total_bytes
                        .fetch_sub(old_size - size, Ordering::Relaxed);
                }
            }
            None => {
                self.object_count.fetch_add(1, Ordering::Relaxed);
                self.total_bytes.fetch_add(size, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        match self.storage.remove(key) {
            Some((_, payload)) => {
                self.account_removed(&payload);
                Ok(!payload.is_expired_at(now))
            }
            None => Ok(false),
        }
    }

    async fn has(&self, key: &str) -> Result<bool> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.live(key).is_some())
    }
}

// =============================================================================
// Tests
// =============================================================================
