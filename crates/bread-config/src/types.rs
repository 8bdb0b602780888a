//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use bread_cache::CacheConfig;
use serde::{Deserialize, Serialize};

/// Root configuration, as read from `bread.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreadConfig {
    /// Session cache tuning.
    pub cache: CacheSection,

    /// Log output.
    pub logging: LoggingSection,
}

impl BreadConfig {
    /// Create a config with every value at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// The `[cache]` section.
///
/// ```toml
/// [cache]
/// capacity = 1024
/// ttl_secs = 300
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Maximum number of sessions held in memory.
    pub capacity: usize,

    /// Idle seconds before a session is written back and dropped.
    /// 0 disables expiry.
    pub ttl_secs: u64,

    /// Milliseconds between expiry sweeps. Defaults to a fifth of the TTL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_interval_ms: Option<u64>,

    /// Dispatcher inbox size.
    pub inbox_capacity: usize,

    /// Concurrent loads from the session database.
    pub max_concurrent_loads: usize,

    /// Concurrent writes to the session database.
    pub max_concurrent_saves: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            capacity: defaults.capacity,
            ttl_secs: defaults.ttl.map_or(0, |ttl| ttl.as_secs()),
            sweep_interval_ms: None,
            inbox_capacity: defaults.inbox_capacity,
            max_concurrent_loads: defaults.max_concurrent_loads,
            max_concurrent_saves: defaults.max_concurrent_saves,
        }
    }
}

impl CacheSection {
    /// Build the cache configuration, rejecting values it cannot run with.
    pub fn to_cache_config(&self) -> crate::Result<CacheConfig> {
        let mut config = CacheConfig::new()
            .with_capacity(self.capacity)
            .with_inbox_capacity(self.inbox_capacity)
            .with_max_concurrent_loads(self.max_concurrent_loads)
            .with_max_concurrent_saves(self.max_concurrent_saves);

        config = match self.ttl_secs {
            0 => config.without_ttl(),
            secs => config.with_ttl(Duration::from_secs(secs)),
        };
        if let Some(ms) = self.sweep_interval_ms {
            config = config.with_sweep_interval(Duration::from_millis(ms));
        }

        config.validate()?;
        Ok(config)
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Console filter directive (e.g. "info", "bread_cache=debug").
    pub level: String,

    /// Emit console logs as JSON.
    pub json: bool,

    /// Directory for daily-rolling JSON log files. Unset disables file logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}
