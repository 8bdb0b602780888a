//! Concurrent copy-back cache with LRU eviction and TTL support.
//!
//! This crate fronts a slow backing store with an in-process cache that:
//! - Serializes every mutation through a single dispatcher task
//! - Folds concurrent misses for one key into a single load
//! - Evicts by least-recent use and by idle time
//! - Writes resolved entries back to the store before discarding them
//!
//! # Example
//!
//! ```rust,ignore
//! use bread_cache::{Cache, CacheConfig, FnStore, LoadError};
//!
//! let config = CacheConfig::default()
//!     .with_capacity(1024)
//!     .with_ttl(Duration::from_secs(300));
//!
//! let store = FnStore::new(
//!     |key: &str| db.read(key).ok_or(LoadError::NotFound),
//!     |entry: &Row| db.write(entry).map_err(SaveError::from),
//! );
//!
//! let cache = Cache::new(config, store)?;
//! let row = cache.get("user-42").await?;
//! ```

mod cache;
mod config;
mod dispatcher;
mod entry;
mod error;
mod line;
mod recency;
mod store;
mod ttl;
mod worker;

pub use cache::{Cache, CacheStats};
pub use config::CacheConfig;
pub use entry::Entry;
pub use error::{Error, LoadError, Result, SaveError};
pub use store::{BackingStore, FnStore};
