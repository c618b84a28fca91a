//! Cache Warmer
//!
//! Preloads a cache from registered async loaders, either all at once or in
//! sequential waves of bounded size. A failing loader is reported and logged
//! but never fails the batch.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::CacheStore;
use crate::config::opt_millis;
use crate::error::{Error, Result};

type Loader<V> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<V>> + Send + Sync>;

/// Warmer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmerConfig {
    /// Per-loader deadline, `None` waits indefinitely
    #[serde(with = "opt_millis", rename = "loader_timeout_ms")]
    pub loader_timeout: Option<Duration>,
    /// Wave size used by [`CacheWarmer::warmup_default`]
    pub default_concurrency: usize,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            loader_timeout: Some(Duration::from_secs(30)),
            default_concurrency: 8,
        }
    }
}

impl WarmerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.default_concurrency == 0 {
            return Err(Error::Config(
                "default_concurrency must be at least 1".to_string(),
            ));
        }
        if self.loader_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "loader_timeout must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// A key whose loader failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmupFailure {
    /// Key whose loader failed, panicked or timed out
    pub key: String,
    /// Rendered error chain
    pub reason: String,
}

/// Outcome of a warmup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    /// Keys loaded into the cache
    pub loaded: Vec<String>,
    /// Keys whose loader failed or timed out
    pub failed: Vec<WarmupFailure>,
    /// Requested keys with no registered loader
    pub unknown: Vec<String>,
    /// Keys skipped because the run was cancelled
    pub cancelled: Vec<String>,
}

impl WarmupReport {
    /// True when every requested key was loaded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unknown.is_empty() && self.cancelled.is_empty()
    }
}

/// Populates a cache from registered loaders
pub struct CacheWarmer<V> {
    target: Arc<dyn CacheStore<String, V>>,
    loaders: Mutex<Vec<(String, Loader<V>)>>,
    config: WarmerConfig,
}

impl<V> CacheWarmer<V>
where
    V: Send + 'static,
{
    /// Create a warmer with default configuration
    pub fn new(target: Arc<dyn CacheStore<String, V>>) -> Self {
        Self {
            target,
            loaders: Mutex::new(Vec::new()),
            config: WarmerConfig::default(),
        }
    }

    /// Create a warmer with custom configuration
    pub fn with_config(target: Arc<dyn CacheStore<String, V>>, config: WarmerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            target,
            loaders: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Register (or replace) the loader for `key`
    pub fn register<F, Fut>(&self, key: impl Into<String>, loader: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let key = key.into();
        let loader: Loader<V> = Arc::new(move || loader().boxed());
        let mut loaders = self.loaders.lock();
        match loaders.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = loader,
            None => loaders.push((key, loader)),
        }
    }

    /// Remove the loader for `key`, returning whether one existed
    pub fn unregister(&self, key: &str) -> bool {
        let mut loaders = self.loaders.lock();
        let before = loaders.len();
        loaders.retain(|(k, _)| k != key);
        loaders.len() != before
    }

    /// Registered keys in registration order
    pub fn registered_keys(&self) -> Vec<String> {
        self.loaders.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Get configuration
    pub fn config(&self) -> &WarmerConfig {
        &self.config
    }

    /// Run every requested loader at once
    ///
    /// `None` warms all registered keys.
    pub async fn warmup(&self, keys: Option<&[String]>) -> WarmupReport {
        let (jobs, mut report) = self.resolve(keys);
        self.run_wave(jobs, &mut report).await;
        self.log_summary(&report);
        report
    }

    /// Run loaders in sequential waves of at most `concurrency`
    ///
    /// Each wave completes before the next starts.
    pub async fn warmup_concurrent(
        &self,
        keys: Option<&[String]>,
        concurrency: usize,
    ) -> Result<WarmupReport> {
        self.warmup_concurrent_with_cancel(keys, concurrency, &CancellationToken::new())
            .await
    }

    /// Waves sized by the configured `default_concurrency`
    pub async fn warmup_default(&self, keys: Option<&[String]>) -> WarmupReport {
        let (jobs, mut report) = self.resolve(keys);
        for wave in chunk(jobs, self.config.default_concurrency) {
            self.run_wave(wave, &mut report).await;
        }
        self.log_summary(&report);
        report
    }

    /// Wave-based warmup that checks `cancel` before each wave
    ///
    /// Keys of waves that never started are listed in `report.cancelled`.
    #[instrument(skip(self, keys, cancel))]
    pub async fn warmup_concurrent_with_cancel(
        &self,
        keys: Option<&[String]>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<WarmupReport> {
        if concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }

        let (jobs, mut report) = self.resolve(keys);
        let mut waves = chunk(jobs, concurrency).into_iter();
        while let Some(wave) = waves.next() {
            if cancel.is_cancelled() {
                report
                    .cancelled
                    .extend(wave.into_iter().map(|(key, _)| key));
                for rest in waves.by_ref() {
                    report.cancelled.extend(rest.into_iter().map(|(key, _)| key));
                }
                warn!(
                    "Warmup cancelled, {} keys not loaded",
                    report.cancelled.len()
                );
                break;
            }
            debug!("Starting warmup wave of {} loaders", wave.len());
            self.run_wave(wave, &mut report).await;
        }

        self.log_summary(&report);
        Ok(report)
    }

    /// Split requested keys into runnable jobs and a report listing unknown ones
    fn resolve(&self, keys: Option<&[String]>) -> (Vec<(String, Loader<V>)>, WarmupReport) {
        let loaders = self.loaders.lock();
        let mut report = WarmupReport::default();

        let jobs = match keys {
            None => loaders.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|key| {
                    let found = loaders
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, loader)| (key.clone(), Arc::clone(loader)));
                    if found.is_none() {
                        report.unknown.push(key.clone());
                    }
                    found
                })
                .collect(),
        };
        (jobs, report)
    }

    async fn run_wave(&self, wave: Vec<(String, Loader<V>)>, report: &mut WarmupReport) {
        let results = join_all(
            wave.into_iter()
                .map(|(key, loader)| async move {
                    let outcome = self.load(&key, loader).await;
                    (key, outcome)
                }),
        )
        .await;

        for (key, outcome) in results {
            match outcome {
                Ok(value) => {
                    self.target.set(key.clone(), value);
                    report.loaded.push(key);
                }
                Err(e) => {
                    warn!("Warmup failed for key {}: {}", key, e);
                    report.failed.push(WarmupFailure {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Run one loader; a panic is caught and reported against its key
    async fn load(&self, key: &str, loader: Loader<V>) -> Result<V> {
        let pending = AssertUnwindSafe(async move { loader().await })
            .catch_unwind()
            .map(|outcome| {
                outcome.unwrap_or_else(|panic| {
                    Err(anyhow::anyhow!("loader panicked: {}", panic_message(&*panic)))
                })
            });
        let result = match self.config.loader_timeout {
            Some(after) => match tokio::time::timeout(after, pending).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(Error::Timeout {
                        operation: format!("loader for {}", key),
                        after,
                    })
                }
            },
            None => pending.await,
        };
        result.map_err(|e| Error::Loader {
            key: key.to_string(),
            reason: format!("{:#}", e),
        })
    }

    fn log_summary(&self, report: &WarmupReport) {
        info!(
            "Warmup finished: {} loaded, {} failed, {} unknown, {} cancelled",
            report.loaded.len(),
            report.failed.len(),
            report.unknown.len(),
            report.cancelled.len()
        );
    }
}

impl<V> std::fmt::Debug for CacheWarmer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWarmer")
            .field("loaders", &self.loaders.lock().len())
            .field("config", &self.config)
            .finish()
    }
}

fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut waves = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        waves.push(items.by_ref().take(size).collect());
    }
    waves
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

// =============================================================================
// Tests
// =============================================================================
