//! Cache Entry Types
//!
//! Entries live in a slab and link to their neighbours by slot index, so the
//! recency list never holds references into itself.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Time-to-live for a cache entry
///
/// `Never` is the no-expiry sentinel. `Millis(0)` expires immediately: the
/// entry is stored but reads treat it as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ttl {
    /// Entry never expires
    #[default]
    Never,
    /// Entry expires this many milliseconds after it was written
    Millis(u64),
}

impl Ttl {
    /// Build a TTL from a duration (sub-millisecond precision is dropped)
    pub fn from_duration(duration: Duration) -> Self {
        Ttl::Millis(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    /// Duration until expiry, `None` for `Never`
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Ttl::Never => None,
            Ttl::Millis(ms) => Some(Duration::from_millis(*ms)),
        }
    }

    /// Absolute deadline for an entry written at `now`
    #[inline]
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        // Saturate far-future deadlines to "never" rather than overflow
        self.as_duration().and_then(|d| now.checked_add(d))
    }

    /// Remaining TTL for an entry with the given deadline
    pub fn remaining(deadline: Option<Instant>, now: Instant) -> Self {
        match deadline {
            None => Ttl::Never,
            Some(at) => Ttl::from_duration(at.saturating_duration_since(now)),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::from_duration(duration)
    }
}

/// Stable index of an entry inside the slab
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    /// Raw slab index
    pub fn index(self) -> usize {
        self.0
    }
}

/// A cache entry owned by the recency list
#[derive(Debug)]
pub struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    /// Absolute expiry, `None` = never
    pub(crate) expires_at: Option<Instant>,
    pub(crate) prev: Option<SlotId>,
    pub(crate) next: Option<SlotId>,
}

impl<K, V> Entry<K, V> {
    /// Create an unlinked entry
    pub fn new(key: K, value: V, expires_at: Option<Instant>) -> Self {
        Self {
            key,
            value,
            expires_at,
            prev: None,
            next: None,
        }
    }

    /// Entry key
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Entry value
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Absolute expiry time
    #[inline]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Check if the entry has expired at `now`
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => now >= at,
            None => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
