//! Shared helpers for watcher integration tests

#![allow(dead_code)]

use livewatch_watcher::{EventCategory, FileChangeEvent, Subscriber, WatchSession};
use std::sync::mpsc::{self, Receiver};
use std::sync::Once;
use std::time::{Duration, Instant};

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging based on environment variables
///
/// Checks `LIVEWATCH_TEST_LOG`, then `RUST_LOG`, defaulting to "error".
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let log_level = std::env::var("LIVEWATCH_TEST_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "error".to_string());

        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Subscribe a recorder to every category of `session`
pub fn record_all(session: &WatchSession) -> Receiver<(EventCategory, FileChangeEvent)> {
    let (tx, rx) = mpsc::channel();
    for category in EventCategory::ALL {
        let tx = tx.clone();
        session
            .subscribe(
                category,
                Subscriber::direct(move |event| {
                    let _ = tx.send((category, event.clone()));
                    Ok(())
                }),
            )
            .expect("subscribe recorder");
    }
    rx
}

/// Wait until an event of `category` for `relative_path` arrives
pub fn wait_for(
    rx: &Receiver<(EventCategory, FileChangeEvent)>,
    category: EventCategory,
    relative_path: &str,
    timeout: Duration,
) -> Option<FileChangeEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok((got, event)) if got == category && event.relative_path == relative_path => {
                return Some(event)
            }
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Collect everything received during `window`
pub fn drain_for(
    rx: &Receiver<(EventCategory, FileChangeEvent)>,
    window: Duration,
) -> Vec<(EventCategory, FileChangeEvent)> {
    let deadline = Instant::now() + window;
    let mut events = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(remaining) {
            Ok(item) => events.push(item),
            Err(_) => break,
        }
    }
    events
}
