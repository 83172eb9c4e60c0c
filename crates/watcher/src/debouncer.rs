//! Per-path debouncing of modification events
//!
//! Editors and the OS notifier often emit several signals for one logical
//! save (write, truncate, metadata update). The tracker lets the first signal
//! for a path through and suppresses the rest of the burst.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Default debounce window
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Remembers when each relative path last produced an accepted event
///
/// Entries are created on first acceptance and overwritten on later ones.
/// They are never purged; the tracker lives as long as one watch session.
#[derive(Debug)]
pub struct DebounceTracker {
    /// Minimum interval between two accepted events for one path
    window: Duration,
    /// Relative path -> instant of the last accepted event
    last_accepted: HashMap<String, Instant>,
}

impl Default for DebounceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl DebounceTracker {
    /// Create a tracker with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Decide whether an event for `relative_path` observed at `now` proceeds
    ///
    /// Returns `false` without touching state when the previous accepted
    /// event is less than one window old. A `now` earlier than the recorded
    /// instant counts as inside the window.
    pub fn accept(&mut self, relative_path: &str, now: Instant) -> bool {
        if let Some(last) = self.last_accepted.get(relative_path) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.window {
                trace!(
                    "Debounced {relative_path:?} ({}ms since last accepted)",
                    elapsed.as_millis()
                );
                return false;
            }
        }

        self.last_accepted.insert(relative_path.to_string(), now);
        true
    }

    /// The configured window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of paths with a recorded acceptance
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    /// Whether no path has been accepted yet
    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}
