//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The file parsed but holds values the cache cannot run with.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<bread_cache::Error> for ConfigError {
    fn from(err: bread_cache::Error) -> Self {
        match err {
            bread_cache::Error::Config(msg) => Self::Invalid(msg),
            other => Self::Invalid(other.to_string()),
        }
    }
}
