//! Configuration module for the livewatch system
//!
//! This module provides configuration structures and loading mechanisms.
//! Configuration can be loaded from TOML files and/or environment variables.

mod defaults;
mod loading;


use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::default_skip_patterns;

use defaults::*;

/// Returns the path to the global configuration file
///
/// The global config is stored at `~/.livewatch/config.toml`.
pub fn global_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::config("Unable to determine home directory".to_string()))?;
    Ok(home_dir.join(".livewatch").join("config.toml"))
}

/// Main configuration structure for the livewatch system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// Configuration for a watch session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Minimum interval between two accepted modifications of the same path
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Paths matching any of these (glob or substring) are ignored
    #[serde(default = "default_skip_patterns")]
    pub skip_patterns: Vec<String>,

    /// File extensions that produce events; empty tracks every extension
    #[serde(default = "default_tracked_extensions")]
    pub tracked_extensions: Vec<String>,

    /// Capacity of the channel between the OS notifier and the observation loop
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            skip_patterns: default_skip_patterns(),
            tracked_extensions: default_tracked_extensions(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

impl WatcherConfig {
    /// Get the debounce window
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Validates the watcher section
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            return Err(Error::config(
                "watcher.max_queue_size must be greater than 0".to_string(),
            ));
        }

        if let Some(ext) = self
            .tracked_extensions
            .iter()
            .find(|ext| ext.trim_start_matches('.').is_empty())
        {
            return Err(Error::config(format!(
                "Invalid tracked extension '{ext}': must not be empty"
            )));
        }

        if self.skip_patterns.iter().any(|p| p.is_empty()) {
            return Err(Error::config(
                "watcher.skip_patterns must not contain empty patterns".to_string(),
            ));
        }

        Ok(())
    }
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        self.watcher.validate()
    }

    /// Saves the configuration to a TOML file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, toml_string)
            .map_err(|e| Error::config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }
}
