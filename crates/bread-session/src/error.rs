//! Error types for session operations.

/// Error type for session cache operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Error from the underlying cache.
    #[error("Cache error: {0}")]
    Cache(#[from] bread_cache::Error),

    /// A fresh session could not be installed because other callers kept
    /// claiming the id.
    #[error("Session contended: {0}")]
    Contended(String),
}

/// Result type for session cache operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error type for session backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A session with this id already exists.
    #[error("Session already exists: {0}")]
    Conflict(String),

    /// The session to update does not exist.
    #[error("Session missing: {0}")]
    Missing(String),

    /// The stored bytes could not be decoded or encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database could not be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}
