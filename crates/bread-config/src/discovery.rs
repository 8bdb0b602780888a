//! Config file discovery.
//!
//! Resolution order (first match wins):
//! 1. An explicit path (the `--config` flag)
//! 2. The file named by `BREAD_CONFIG`
//! 3. `./bread.toml` (project-local)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{BreadConfig, ConfigError, Result};

/// Default config filename for project-local config.
pub const PROJECT_CONFIG_FILE: &str = "bread.toml";

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "BREAD_CONFIG";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The effective configuration.
    pub config: BreadConfig,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
    /// Warnings generated during loading (e.g., a malformed project file).
    pub warnings: Vec<String>,
}

/// Load configuration, discovering the file when `path` is `None`.
///
/// A file named explicitly or through `BREAD_CONFIG` must exist and parse.
/// A broken `./bread.toml` only produces a warning and the defaults.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let env_path = std::env::var(CONFIG_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    load_config_with_options(path.or(env_path.as_deref()), None)
}

/// Load configuration with explicit control over the project directory.
///
/// `project_dir` replaces the current directory when looking for
/// `bread.toml`. The environment is not consulted.
pub fn load_config_with_options(
    path: Option<&Path>,
    project_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    if let Some(path) = path {
        let config = load_config_file(path)?;
        debug!(path = %path.display(), "Loaded config");
        return Ok(LoadedConfig {
            config,
            source: Some(path.to_path_buf()),
            warnings: Vec::new(),
        });
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));

    if !project_path.is_file() {
        return Ok(LoadedConfig {
            config: BreadConfig::default(),
            source: None,
            warnings: Vec::new(),
        });
    }

    match load_config_file(&project_path) {
        Ok(config) => {
            debug!(path = %project_path.display(), "Loaded config");
            Ok(LoadedConfig {
                config,
                source: Some(project_path),
                warnings: Vec::new(),
            })
        }
        Err(e) => {
            warn!(path = %project_path.display(), error = %e, "Ignoring config file");
            Ok(LoadedConfig {
                config: BreadConfig::default(),
                source: None,
                warnings: vec![format!("Failed to load {}: {}", project_path.display(), e)],
            })
        }
    }
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<BreadConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = BreadConfig::from_toml(&contents)?;
    config.cache.to_cache_config()?;
    Ok(config)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            r#"
[cache]
capacity = 32
ttl_secs = 0
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.cache.capacity, 32);
        assert_eq!(config.cache.ttl_secs, 0);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/bread.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bread.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bread.toml");
        fs::write(&path, "[cache]\nmax_concurrent_loads = 0\n").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let project = TempDir::new().unwrap();
        fs::write(project.path().join("bread.toml"), "[cache]\ncapacity = 1\n").unwrap();

        let other = TempDir::new().unwrap();
        let explicit = other.path().join("explicit.toml");
        fs::write(&explicit, "[cache]\ncapacity = 2\n").unwrap();

        let loaded = load_config_with_options(Some(&explicit), Some(project.path())).unwrap();
        assert_eq!(loaded.config.cache.capacity, 2);
        assert_eq!(loaded.source.as_deref(), Some(explicit.as_path()));
    }

    #[test]
    fn test_load_config_project_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("bread.toml"),
            r#"
[logging]
level = "debug"
"#,
        )
        .unwrap();

        let loaded = load_config_with_options(None, Some(dir.path())).unwrap();
        assert_eq!(loaded.config.logging.level, "debug");
        assert!(loaded.source.unwrap().ends_with("bread.toml"));
    }

    #[test]
    fn test_load_config_no_files() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config_with_options(None, Some(dir.path())).unwrap();
        assert_eq!(loaded.config, BreadConfig::default());
        assert!(loaded.source.is_none());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_malformed_project_config_warns_but_continues() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bread.toml"), "not valid toml {{{{").unwrap();

        let loaded = load_config_with_options(None, Some(dir.path())).unwrap();
        assert_eq!(loaded.config, BreadConfig::default());
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = load_config_with_options(Some(&missing), None).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
