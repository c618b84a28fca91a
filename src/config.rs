//! Configuration
//!
//! Every component config derives serde with `#[serde(default)]`, so a file
//! only needs the fields it changes. Durations are written in milliseconds.
//!
//! ```yaml
//! lru:
//!   max_size: 5000
//!   sweep_interval_ms: 30000
//! adaptive:
//!   min_size: 100
//!   max_size: 50000
//!   target_hit_rate: 0.85
//! multi_level:
//!   l2_key_prefix: "app:"
//!   l2_timeout_ms: 50
//! pool:
//!   max_size: 128
//! warmer:
//!   loader_timeout_ms: 10000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::{AdaptiveConfig, LruConfig, MultiLevelConfig, WarmerConfig};
use crate::error::Result;
use crate::pool::PoolConfig;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateCacheConfig {
    /// Standalone LRU cache
    pub lru: LruConfig,
    /// Adaptive cache
    pub adaptive: AdaptiveConfig,
    /// Two-tier cache
    pub multi_level: MultiLevelConfig,
    /// Object pool
    pub pool: PoolConfig,
    /// Cache warmer
    pub warmer: WarmerConfig,
}

impl StateCacheConfig {
    /// Parse and validate YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.lru.validate()?;
        self.adaptive.validate()?;
        self.multi_level.validate()?;
        self.pool.validate()?;
        self.warmer.validate()?;
        Ok(())
    }
}

/// `Duration` as integer milliseconds
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as integer milliseconds, `null` for `None`
pub mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis().min(u64::MAX as u128) as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Ttl;
    use crate::error::Error;
    use std::time::Duration;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StateCacheConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, StateCacheConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
lru:
  max_size: 5000
  sweep_interval_ms: 30000
adaptive:
  min_size: 50
  initial_size: 200
  max_size: 50000
  target_hit_rate: 0.85
  adjust_interval_ms: 1500
multi_level:
  l2_key_prefix: "app:"
  l2_timeout_ms: 50
pool:
  max_size: 128
warmer:
  loader_timeout_ms: null
  default_concurrency: 4
"#;
        let config = StateCacheConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.lru.max_size, 5000);
        assert_eq!(config.lru.sweep_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.lru.default_ttl, Ttl::Never);
        assert_eq!(config.adaptive.target_hit_rate, 0.85);
        assert_eq!(config.adaptive.adjust_interval, Duration::from_millis(1500));
        assert_eq!(config.multi_level.l2_key_prefix, "app:");
        assert_eq!(config.multi_level.l2_timeout, Duration::from_millis(50));
        assert_eq!(config.pool.max_size, 128);
        assert_eq!(config.warmer.loader_timeout, None);
        assert_eq!(config.warmer.default_concurrency, 4);
    }

    #[test]
    fn test_disabled_sweeper() {
        let config = StateCacheConfig::from_yaml_str("lru:\n  sweep_interval_ms: null\n").unwrap();
        assert_eq!(config.lru.sweep_interval, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = StateCacheConfig::from_yaml_str("lru:\n  max_size: 0\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let result = StateCacheConfig::from_yaml_str("adaptive:\n  grow_factor: 0.5\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = StateCacheConfig::from_yaml_str("lru: [unclosed");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = StateCacheConfig::from_file("/nonexistent/statecache.yaml");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_yaml_roundtrip_preserves_durations() {
        let config = StateCacheConfig::default();
        let text = serde_yaml::to_string(&config).unwrap();
        assert!(text.contains("sweep_interval_ms: 60000"));
        assert_eq!(StateCacheConfig::from_yaml_str(&text).unwrap(), config);
    }
}
