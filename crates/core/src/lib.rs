//! Core types for the livewatch file-change notification system
//!
//! This crate provides the foundational pieces shared by the other livewatch
//! crates:
//!
//! - **Error handling**: Unified error type and result alias
//! - **Configuration**: Watcher configuration loaded from TOML and environment
//!

pub mod config;
pub mod error;

// Re-export main types for convenience
pub use config::{Config, WatcherConfig};
pub use error::{Error, Result, ResultExt};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, WatcherConfig};
    pub use crate::error::{Result, ResultExt};
}
