//! Configuration for the cache.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default maximum number of resident lines.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default idle time before a line expires.
pub const DEFAULT_TTL: Option<Duration> = Some(Duration::from_secs(5 * 60));

/// Default dispatcher inbox size.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Default number of loads that may run at once.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 16;

/// Default number of copy-backs that may run at once.
pub const DEFAULT_MAX_CONCURRENT_SAVES: usize = 4;

/// Fraction of the TTL between two sweeps when no interval is configured.
const SWEEPS_PER_TTL: u32 = 5;

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of lines (resolved or pending) before LRU eviction.
    pub capacity: usize,

    /// Maximum idle time for a resolved line.
    /// `None` disables expiry and the sweeper task.
    pub ttl: Option<Duration>,

    /// Interval between TTL sweeps. Defaults to a fifth of the TTL, which
    /// bounds detection latency to 20% of the TTL.
    pub sweep_interval: Option<Duration>,

    /// Capacity of the dispatcher's message inbox.
    pub inbox_capacity: usize,

    /// Upper bound on concurrent backing store loads.
    pub max_concurrent_loads: usize,

    /// Upper bound on concurrent backing store saves.
    pub max_concurrent_saves: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
            sweep_interval: None,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            max_concurrent_saves: DEFAULT_MAX_CONCURRENT_SAVES,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of resident lines.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the idle TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disable TTL (lines only leave the cache under capacity pressure).
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Set an explicit sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the dispatcher inbox capacity.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Set the maximum number of concurrent loads.
    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.max_concurrent_loads = max;
        self
    }

    /// Set the maximum number of concurrent saves.
    pub fn with_max_concurrent_saves(mut self, max: usize) -> Self {
        self.max_concurrent_saves = max;
        self
    }

    /// The effective sweep interval, if expiry is enabled.
    pub fn effective_sweep_interval(&self) -> Option<Duration> {
        let ttl = self.ttl?;
        Some(self.sweep_interval.unwrap_or(ttl / SWEEPS_PER_TTL))
    }

    /// Check the configuration for values the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("capacity must be at least 1".into()));
        }
        if self.inbox_capacity == 0 {
            return Err(Error::Config("inbox_capacity must be at least 1".into()));
        }
        if self.max_concurrent_loads == 0 || self.max_concurrent_saves == 0 {
            return Err(Error::Config(
                "worker limits must be at least 1".into(),
            ));
        }
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(Error::Config("ttl must be non-zero".into()));
        }
        if self.effective_sweep_interval().is_some_and(|i| i.is_zero()) {
            return Err(Error::Config("sweep_interval must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity, 1024);
        assert_eq!(
            config.effective_sweep_interval(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_sweep_interval_is_fifth_of_ttl() {
        let config = CacheConfig::new().with_ttl(Duration::from_secs(20));
        assert_eq!(
            config.effective_sweep_interval(),
            Some(Duration::from_secs(4))
        );

        let config = config.with_sweep_interval(Duration::from_millis(250));
        assert_eq!(
            config.effective_sweep_interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_no_ttl_means_no_sweep() {
        let config = CacheConfig::new()
            .with_sweep_interval(Duration::from_secs(1))
            .without_ttl();
        assert_eq!(config.effective_sweep_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        assert!(CacheConfig::new().with_capacity(0).validate().is_err());
        assert!(CacheConfig::new().with_inbox_capacity(0).validate().is_err());
        assert!(
            CacheConfig::new()
                .with_max_concurrent_loads(0)
                .validate()
                .is_err()
        );
        assert!(
            CacheConfig::new()
                .with_ttl(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
