//! Error types for cache operations.

/// Error type for cache operations.
///
/// Errors are `Clone` because a single load outcome is delivered to every
/// caller waiting on the same key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The backing store could not be reached while loading a key.
    ///
    /// Distinct from "not found": the key may exist, and the caller decides
    /// whether to retry.
    #[error("Backing store unavailable for {key}: {reason}")]
    Unavailable { key: String, reason: String },

    /// A deadline-bounded lookup gave up before the key resolved.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// A pending line was evicted under capacity pressure before its load
    /// completed.
    #[error("Evicted before load completed: {0}")]
    Evicted(String),

    /// The dispatcher has stopped and no longer accepts requests.
    #[error("Cache is closed")]
    Closed,

    /// The cache configuration was rejected.
    #[error("Invalid cache configuration: {0}")]
    Config(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome reported by [`BackingStore::load`](crate::BackingStore::load)
/// when no entry is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The key does not exist in the backing store.
    #[error("not found")]
    NotFound,

    /// The store failed transiently (I/O error, timeout, ...).
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by [`BackingStore::save`](crate::BackingStore::save).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("save failed: {0}")]
pub struct SaveError(pub String);

impl SaveError {
    /// Create a save error from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}
