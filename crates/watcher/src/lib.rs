#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! File change observation and notification
//!
//! This crate watches a workspace directory and notifies subscribers when
//! tracked files change:
//! - Glob and substring skip rules for VCS, build and cache directories
//! - Extension filtering and per-path debouncing of modifications
//! - Subscribers per event category, invoked directly or scheduled onto a
//!   tokio runtime
//! - Subscriber failures are logged and isolated from the observation loop
//!
//! # Example
//!
//! ```no_run
//! use livewatch_watcher::{EventCategory, Subscriber, WatchSession, WatcherConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = WatchSession::new("/path/to/project", WatcherConfig::default())?;
//!
//! session.subscribe(
//!     EventCategory::FileChanged,
//!     Subscriber::direct(|event| {
//!         println!("File changed: {}", event.relative_path);
//!         Ok(())
//!     }),
//! )?;
//!
//! session.start(None)?;
//! // ...
//! session.stop()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod debouncer;
mod dispatcher;
mod events;
mod ignore;
mod pipeline;
mod registry;
mod session;

pub use config::{WatcherConfig, WatcherConfigBuilder};
pub use debouncer::{DebounceTracker, DEFAULT_DEBOUNCE_WINDOW};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use events::{ChangeType, EventCategory, FileChangeEvent};
pub use ignore::{PathFilter, TrackedExtensions};
pub use pipeline::{relativize, RawKind, RawSignal, SignalPipeline};
pub use registry::{DeliveryMode, Subscriber, SubscriberRegistry, SubscriptionId};
pub use session::{SessionState, WatchSession};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::WatcherConfig;
    pub use crate::events::{ChangeType, EventCategory, FileChangeEvent};
    pub use crate::registry::{Subscriber, SubscriptionId};
    pub use crate::session::WatchSession;
}
