//! statecache workload driver
//!
//! Runs a synthetic skewed workload against the caching components and
//! reports how they behaved.
//!
//! # Phases
//!
//! ```text
//! ┌────────────┐    ┌─────────────────────┐    ┌──────────────────┐
//! │   Warmer   │───▶│   Adaptive cache    │───▶│   Multi-level    │
//! │ (hot keys) │    │ (skewed reads/pool) │    │ (L2 promotion)   │
//! └────────────┘    └─────────────────────┘    └──────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use statecache::cache::{JsonSerializer, ValueSerializer};
use statecache::hash::{hash, Value};
use statecache::{
    AdaptDecision, AdaptiveCache, CacheMetricsExporter, CacheStore, CacheWarmer, InMemoryL2Store,
    L2Store, MultiLevelCache, ObjectPool, Result, StateCacheConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// statecache - synthetic cache and pool workload
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "STATECACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of read-through operations
    #[arg(long, env = "STATECACHE_OPS", default_value = "100000")]
    ops: u64,

    /// Size of the key space
    #[arg(long, env = "STATECACHE_KEYS", default_value = "10000")]
    keys: u64,

    /// Skew exponent; higher values concentrate traffic on fewer keys
    #[arg(long, env = "STATECACHE_SKEW", default_value = "3.0")]
    skew: f64,

    /// Operations between adaptive resize decisions
    #[arg(long, env = "STATECACHE_ADAPT_EVERY", default_value = "5000")]
    adapt_every: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print Prometheus metrics when done
    #[arg(long)]
    print_metrics: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => StateCacheConfig::from_file(path)?,
        None => StateCacheConfig::default(),
    };

    info!("Starting statecache workload");
    info!("  Operations: {}", args.ops);
    info!("  Key space: {}", args.keys);
    info!("  Skew: {}", args.skew);
    info!(
        "  Adaptive bounds: {}..{} (target hit rate {})",
        config.adaptive.min_size, config.adaptive.max_size, config.adaptive.target_hit_rate
    );

    let exporter = CacheMetricsExporter::new()?;
    let cache = Arc::new(AdaptiveCache::<String, String>::new(config.adaptive.clone())?);
    let pool = ObjectPool::new(config.pool.clone(), || Vec::<u8>::with_capacity(256), Vec::clear)?;

    // Warm the head of the distribution before traffic arrives
    let warmer = CacheWarmer::with_config(
        cache.clone() as Arc<dyn CacheStore<String, String>>,
        config.warmer.clone(),
    )?;
    for rank in 0..args.keys.min(32) {
        warmer.register(key_for(rank), move || async move { Ok(render(rank)) });
    }
    let report = warmer
        .warmup_concurrent(None, config.warmer.default_concurrency)
        .await?;
    exporter.observe_warmup(&report);

    // Skewed read-through
    let start = Instant::now();
    let mut rng = XorShift::new(0x5eed_cafe);
    let mut resizes = 0u64;
    for op in 1..=args.ops {
        let rank = rng.skewed(args.keys, args.skew);
        let key = key_for(rank);
        if cache.get(&key).is_none() {
            let mut buffer = pool.acquire_scoped();
            buffer.extend_from_slice(render(rank).as_bytes());
            let value = String::from_utf8_lossy(&buffer).into_owned();
            cache.set(key, value);
        }

        if args.adapt_every > 0 && op % args.adapt_every == 0 {
            exporter.observe_access("adaptive", &cache.stats());
            match cache.adapt()? {
                AdaptDecision::Grew { .. } | AdaptDecision::Shrank { .. } => resizes += 1,
                AdaptDecision::Unchanged | AdaptDecision::Skipped => {}
            }
        }
    }
    let elapsed = start.elapsed();

    exporter.observe_access("adaptive", &cache.stats());
    exporter.observe_capacity("adaptive", cache.capacity());
    exporter.observe_pool("buffers", &pool.stats());

    info!(
        "Workload finished in {:?}: capacity {} after {} resizes, {} entries resident",
        elapsed,
        cache.capacity(),
        resizes,
        cache.len()
    );
    let pool_stats = pool.stats();
    info!(
        "Pool: {} acquires, {} misses (rate {:.3}), preallocate target {}",
        pool_stats.acquires,
        pool_stats.misses,
        pool_stats.miss_rate(),
        pool_stats.preallocate_target
    );

    run_multi_level(&config, &exporter).await?;

    cache.dispose();

    if args.print_metrics {
        print!("{}", exporter.encode()?);
    }

    info!("statecache workload complete");
    Ok(())
}

/// Write through a two-tier cache, drop L1, and read everything back
async fn run_multi_level(config: &StateCacheConfig, exporter: &CacheMetricsExporter) -> Result<()> {
    let l2: Arc<dyn L2Store> = Arc::new(InMemoryL2Store::new());
    let tiers: MultiLevelCache<Value, ProfileSerializer> = MultiLevelCache::with_serializer(
        config.multi_level.clone(),
        Some(l2),
        ProfileSerializer::default(),
    )?;

    let mut digests = Vec::new();
    for id in 0..100i64 {
        let profile = Value::map(vec![
            ("id", Value::from(id)),
            ("name", Value::from(render(id as u64))),
        ]);
        let key = hash(&profile);
        tiers.set(&key, profile).await;
        digests.push(key);
    }

    tiers.clear();
    for key in &digests {
        tiers.get(key).await;
    }

    let stats = tiers.stats();
    exporter.observe_tiers("profiles", &stats);
    info!(
        "Multi-level: {} L2 hits, {} promotions, {} L2 errors",
        stats.l2_hits, stats.promotions, stats.l2_errors
    );
    tiers.dispose();
    Ok(())
}

/// Encodes hashable values through their JSON form
#[derive(Default)]
struct ProfileSerializer {
    json: JsonSerializer<serde_json::Value>,
}

impl ValueSerializer<Value> for ProfileSerializer {
    fn serialize(&self, value: &Value) -> Result<bytes::Bytes> {
        self.json.serialize(&value.to_json())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        self.json.deserialize(bytes).map(Value::from)
    }
}

fn key_for(rank: u64) -> String {
    format!("item:{}", rank)
}

fn render(rank: u64) -> String {
    format!("payload-{:08}", rank)
}

/// Small deterministic generator for the synthetic workload
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Rank in `0..n`, biased toward 0 as `skew` grows
    fn skewed(&mut self, n: u64, skew: f64) -> u64 {
        let u = self.next_f64().powf(skew.max(1.0));
        ((u * n as f64) as u64).min(n.saturating_sub(1))
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
