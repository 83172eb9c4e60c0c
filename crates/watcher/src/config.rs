//! Builder for watch session configuration
//!
//! The configuration type itself lives in `livewatch-core` so it can be
//! loaded from TOML and the environment; this module adds a fluent builder
//! for programmatic construction.

pub use livewatch_core::config::WatcherConfig;

use livewatch_core::error::Result;
use std::time::Duration;

/// Builder for [`WatcherConfig`]
#[derive(Debug, Default)]
pub struct WatcherConfigBuilder {
    config: WatcherConfig,
}

impl WatcherConfigBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set debounce window in milliseconds
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.debounce_ms = ms;
        self
    }

    /// Set debounce window in (fractional) seconds
    ///
    /// Negative and non-finite values clamp to zero.
    pub fn debounce_secs(mut self, secs: f64) -> Self {
        let window = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
        self.config.debounce_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replace the skip patterns
    pub fn skip_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.skip_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a skip pattern
    pub fn add_skip_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.skip_patterns.push(pattern.into());
        self
    }

    /// Replace the tracked extensions; an empty list tracks every file
    pub fn tracked_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.tracked_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Add a tracked extension
    pub fn add_tracked_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.tracked_extensions.push(extension.into());
        self
    }

    /// Set maximum queue size
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<WatcherConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
