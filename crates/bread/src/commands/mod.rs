//! CLI command handlers.

use std::path::PathBuf;

use bread_config::BreadConfig;

pub mod config;
pub mod simulate;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Effective configuration.
    pub config: BreadConfig,
    /// File the configuration came from, if any.
    pub config_source: Option<PathBuf>,
}
