//! Configuration loading, with lock-free hot reload for embedding/tests.
//!
//! The shipped binary loads a `Config` once at startup and threads it
//! through to the `Cache`/`Pipeline`/`Server` explicitly, deliberately
//! avoiding a module-level singleton; `reload` exists for embedders and tests
//! that want to observe a config change without rebinding the listener or
//! resizing a live cache, neither of which this proxy supports mid-flight.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::types::{Config, ValidationError};

/// Configuration loading/reload errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file path does not exist.
    #[error("config file not found: {0}")]
    NotFound(String),
    /// Reading the config file failed.
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),
    /// The file did not parse as valid TOML matching [`Config`]'s shape.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// The file parsed but failed range validation.
    #[error("config validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// A lock-free, swappable holder for the current [`Config`].
pub struct ConfigLoader {
    config: ArcSwap<Config>,
    config_path: Option<std::path::PathBuf>,
}

impl ConfigLoader {
    /// Loads and validates a config from a TOML file on disk.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse_and_validate(&content)?;
        Ok(ConfigLoader {
            config: ArcSwap::from_pointee(config),
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Loads and validates a config from an in-memory TOML string.
    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_and_validate(content)?;
        Ok(ConfigLoader {
            config: ArcSwap::from_pointee(config),
            config_path: None,
        })
    }

    fn parse_and_validate(content: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The current config, lock-free.
    #[inline]
    pub fn get(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Re-reads the backing file (if any) and atomically swaps in the new
    /// config. Existing holders of the previous `Arc<Config>` keep seeing the
    /// old values until they reload themselves.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::NotFound("no config file path set".to_string()))?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse_and_validate(&content)?;
        self.config.store(Arc::new(config));
        tracing::info!("configuration reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
listen_port = 8888
idle_timeout = 30
max_object_bytes = 1000000
max_cache_bytes = 10000000
proxy_id = "waypoint-test"
"#;

    #[test]
    fn loads_a_valid_config_from_string() {
        let loader = ConfigLoader::load_str(VALID).unwrap();
        let config = loader.get();
        assert_eq!(config.listen_port, 8888);
        assert_eq!(config.proxy_id, "waypoint-test");
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = r#"
listen_port = 80
idle_timeout = 30
max_object_bytes = 1000000
max_cache_bytes = 10000000
"#;
        assert!(ConfigLoader::load_str(bad).is_err());
    }

    #[test]
    fn load_file_reports_not_found() {
        let result = ConfigLoader::load_file("/nonexistent/waypoint.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn reload_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoint.toml");
        std::fs::write(&path, VALID).unwrap();
        let loader = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(loader.get().proxy_id, "waypoint-test");

        let updated = VALID.replace("waypoint-test", "waypoint-reloaded");
        std::fs::write(&path, updated).unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().proxy_id, "waypoint-reloaded");
    }
}
