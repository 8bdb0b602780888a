//! Configuration for bread.
//!
//! Settings come from a single TOML file (`bread.toml`) with a `[cache]`
//! and a `[logging]` section. Every field has a default, so a missing file
//! or a partial one is fine.

mod discovery;
mod error;
mod types;

pub use discovery::{
    CONFIG_ENV, LoadedConfig, PROJECT_CONFIG_FILE, load_config, load_config_file,
    load_config_with_options,
};
pub use error::{ConfigError, Result};
pub use types::{BreadConfig, CacheSection, LoggingSection};
