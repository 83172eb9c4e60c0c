//! Configuration loading from files and environment variables

use crate::error::{Error, Result};
use config::{Config as ConfigLib, Environment, File};
use std::path::Path;
use tracing::debug;

use super::{global_config_path, Config};

impl Config {
    /// Loads configuration from a TOML file with environment variable overrides
    ///
    /// Environment variables are prefixed with `LIVEWATCH_` and use double underscores
    /// for nested values. List values are comma separated. For example:
    /// - `LIVEWATCH_WATCHER__DEBOUNCE_MS=250`
    /// - `LIVEWATCH_WATCHER__TRACKED_EXTENSIONS=py,pyi`
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut builder = ConfigLib::builder();

        // Add the config file if it exists
        if path.exists() {
            debug!("Loading configuration from {path:?}");
            builder = builder.add_source(File::from(path));
        } else {
            debug!("No configuration file at {path:?}, using defaults");
        }

        // Add environment variables with LIVEWATCH_ prefix
        builder = builder.add_source(
            Environment::with_prefix("LIVEWATCH")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("watcher.skip_patterns")
                .with_list_parse_key("watcher.tracked_extensions")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build config: {e}")))?
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Creates a config from a TOML string (useful for testing)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from a single file
    ///
    /// Precedence (lowest to highest):
    /// 1. Hardcoded defaults
    /// 2. Config file (~/.livewatch/config.toml or custom path)
    /// 3. Environment variables (LIVEWATCH_*)
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => global_config_path()?,
        };
        Self::from_file(&path)
    }
}
