//! Metrics module
//!
//! Exposes cache, pool and tier statistics as Prometheus gauges.
//!
//! Components keep their own atomic counters; the exporter copies snapshots
//! into its registry on demand, so nothing on the hot path touches Prometheus.

use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::{AccessStats, TierStats, WarmupReport};
use crate::error::{Error, Result};
use crate::pool::PoolStats;

const NAMESPACE: &str = "statecache";

/// Prometheus exporter for statecache components
///
/// Every series carries a `name` label so several caches or pools can share
/// one exporter.
pub struct CacheMetricsExporter {
    registry: Registry,
    cache_requests: IntGaugeVec,
    cache_evictions: IntGaugeVec,
    cache_size: IntGaugeVec,
    cache_capacity: IntGaugeVec,
    cache_hit_rate: GaugeVec,
    pool_events: IntGaugeVec,
    pool_items: IntGaugeVec,
    pool_miss_rate: GaugeVec,
    tier_events: IntGaugeVec,
    warmup_keys: IntCounterVec,
}

impl CacheMetricsExporter {
    /// Create an exporter with its own registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create an exporter registering into `registry`
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let cache_requests = IntGaugeVec::new(
            Opts::new("cache_requests", "Cache lookups in the current window by result")
                .namespace(NAMESPACE),
            &["name", "result"],
        )?;
        let cache_evictions = IntGaugeVec::new(
            Opts::new("cache_evictions", "Capacity evictions in the current window")
                .namespace(NAMESPACE),
            &["name"],
        )?;
        let cache_size = IntGaugeVec::new(
            Opts::new("cache_size", "Resident cache entries").namespace(NAMESPACE),
            &["name"],
        )?;
        let cache_capacity = IntGaugeVec::new(
            Opts::new("cache_capacity", "Cache capacity in entries").namespace(NAMESPACE),
            &["name"],
        )?;
        let cache_hit_rate = GaugeVec::new(
            Opts::new("cache_hit_rate", "Hit rate of the current window").namespace(NAMESPACE),
            &["name"],
        )?;
        let pool_events = IntGaugeVec::new(
            Opts::new("pool_events", "Object pool counters by event").namespace(NAMESPACE),
            &["name", "event"],
        )?;
        let pool_items = IntGaugeVec::new(
            Opts::new("pool_items", "Object pool item gauges by kind").namespace(NAMESPACE),
            &["name", "kind"],
        )?;
        let pool_miss_rate = GaugeVec::new(
            Opts::new("pool_miss_rate", "Fraction of acquisitions that built a new item")
                .namespace(NAMESPACE),
            &["name"],
        )?;
        let tier_events = IntGaugeVec::new(
            Opts::new("tier_events", "Multi-level cache counters by event").namespace(NAMESPACE),
            &["name", "event"],
        )?;
        let warmup_keys = IntCounterVec::new(
            Opts::new("warmup_keys_total", "Keys processed by the warmer by outcome")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;

        registry.register(Box::new(cache_requests.clone()))?;
        registry.register(Box::new(cache_evictions.clone()))?;
        registry.register(Box::new(cache_size.clone()))?;
        registry.register(Box::new(cache_capacity.clone()))?;
        registry.register(Box::new(cache_hit_rate.clone()))?;
        registry.register(Box::new(pool_events.clone()))?;
        registry.register(Box::new(pool_items.clone()))?;
        registry.register(Box::new(pool_miss_rate.clone()))?;
        registry.register(Box::new(tier_events.clone()))?;
        registry.register(Box::new(warmup_keys.clone()))?;

        Ok(Self {
            registry,
            cache_requests,
            cache_evictions,
            cache_size,
            cache_capacity,
            cache_hit_rate,
            pool_events,
            pool_items,
            pool_miss_rate,
            tier_events,
            warmup_keys,
        })
    }

    /// Copy an analyzer snapshot
    pub fn observe_access(&self, name: &str, stats: &AccessStats) {
        self.cache_requests
            .with_label_values(&[name, "hit"])
            .set(stats.hits as i64);
        self.cache_requests
            .with_label_values(&[name, "miss"])
            .set(stats.misses as i64);
        self.cache_evictions
            .with_label_values(&[name])
            .set(stats.evictions as i64);
        self.cache_size
            .with_label_values(&[name])
            .set(stats.size as i64);
        self.cache_hit_rate
            .with_label_values(&[name])
            .set(stats.hit_rate);
    }

    /// Record a cache's current capacity
    pub fn observe_capacity(&self, name: &str, capacity: usize) {
        self.cache_capacity
            .with_label_values(&[name])
            .set(capacity as i64);
    }

    /// Copy a pool snapshot
    pub fn observe_pool(&self, name: &str, stats: &PoolStats) {
        for (event, value) in [
            ("acquire", stats.acquires),
            ("release", stats.releases),
            ("miss", stats.misses),
            ("discard", stats.discarded),
            ("create", stats.created),
        ] {
            self.pool_events
                .with_label_values(&[name, event])
                .set(value as i64);
        }
        self.pool_items
            .with_label_values(&[name, "available"])
            .set(stats.available as i64);
        self.pool_items
            .with_label_values(&[name, "preallocate_target"])
            .set(stats.preallocate_target as i64);
        self.pool_miss_rate
            .with_label_values(&[name])
            .set(stats.miss_rate());
    }

    /// Copy a multi-level cache snapshot
    pub fn observe_tiers(&self, name: &str, stats: &TierStats) {
        for (event, value) in [
            ("l1_hit", stats.l1_hits),
            ("l2_hit", stats.l2_hits),
            ("miss", stats.misses),
            ("promotion", stats.promotions),
            ("l2_error", stats.l2_errors),
        ] {
            self.tier_events
                .with_label_values(&[name, event])
                .set(value as i64);
        }
    }

    /// Accumulate the outcome of a warmup run
    pub fn observe_warmup(&self, report: &WarmupReport) {
        for (outcome, count) in [
            ("loaded", report.loaded.len()),
            ("failed", report.failed.len()),
            ("unknown", report.unknown.len()),
            ("cancelled", report.cancelled.len()),
        ] {
            self.warmup_keys
                .with_label_values(&[outcome])
                .inc_by(count as u64);
        }
    }

    /// The underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all series in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl std::fmt::Debug for CacheMetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetricsExporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::WarmupFailure;

    #[test]
    fn test_access_stats_exported() {
        let exporter = CacheMetricsExporter::new().unwrap();
        exporter.observe_access(
            "sessions",
            &AccessStats {
                hits: 3,
                misses: 1,
                hit_rate: 0.75,
                size: 2,
                evictions: 1,
                operations: 4,
            },
        );
        exporter.observe_capacity("sessions", 16);

        let text = exporter.encode().unwrap();
        assert!(text.contains(r#"statecache_cache_requests{name="sessions",result="hit"} 3"#));
        assert!(text.contains(r#"statecache_cache_hit_rate{name="sessions"} 0.75"#));
        assert!(text.contains(r#"statecache_cache_capacity{name="sessions"} 16"#));
    }

    #[test]
    fn test_pool_and_tier_stats_exported() {
        let exporter = CacheMetricsExporter::new().unwrap();
        exporter.observe_pool(
            "buffers",
            &PoolStats {
                acquires: 10,
                misses: 2,
                available: 4,
                ..Default::default()
            },
        );
        exporter.observe_tiers(
            "profiles",
            &TierStats {
                l2_hits: 5,
                promotions: 5,
                ..Default::default()
            },
        );

        let text = exporter.encode().unwrap();
        assert!(text.contains(r#"statecache_pool_events{event="acquire",name="buffers"} 10"#));
        assert!(text.contains(r#"statecache_pool_miss_rate{name="buffers"} 0.2"#));
        assert!(text.contains(r#"statecache_tier_events{event="promotion",name="profiles"} 5"#));
    }

    #[test]
    fn test_warmup_counters_accumulate() {
        let exporter = CacheMetricsExporter::new().unwrap();
        let report = WarmupReport {
            loaded: vec!["a".to_string(), "b".to_string()],
            failed: vec![WarmupFailure {
                key: "c".to_string(),
                reason: "down".to_string(),
            }],
            ..Default::default()
        };
        exporter.observe_warmup(&report);
        exporter.observe_warmup(&report);

        let text = exporter.encode().unwrap();
        assert!(text.contains(r#"statecache_warmup_keys_total{outcome="loaded"} 4"#));
        assert!(text.contains(r#"statecache_warmup_keys_total{outcome="failed"} 2"#));
    }

    #[test]
    fn test_shared_registry_rejects_duplicates() {
        let registry = Registry::new();
        CacheMetricsExporter::with_registry(registry.clone()).unwrap();
        let result = CacheMetricsExporter::with_registry(registry);
        assert!(matches!(result, Err(Error::Metrics(_))));
    }
}
