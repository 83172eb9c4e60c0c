//! Watch session lifecycle and the background observation loop
//!
//! A session owns a canonicalized workspace root, the subscriber registry and
//! at most one observation thread. The thread owns the notify watcher, so the
//! OS watch handle is released whenever the thread exits, whether it was
//! stopped, the notifier failed or a panic unwound it.

use crate::debouncer::DebounceTracker;
use crate::dispatcher::Dispatcher;
use crate::events::EventCategory;
use crate::ignore::{PathFilter, TrackedExtensions};
use crate::pipeline::{RawSignal, SignalPipeline};
use crate::registry::{Subscriber, SubscriberRegistry, SubscriptionId};
use crossbeam_channel::{at, bounded, never, select, Receiver, Sender, TrySendError};
use livewatch_core::config::WatcherConfig;
use livewatch_core::error::{Error, Result, ResultExt};
use notify::{
    Config as NotifyConfig, Event as NotifyEvent, RecommendedWatcher, RecursiveMode,
    Watcher as NotifyWatcher,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Sending end of the channel between the OS notifier and the loop
type SignalSender = Sender<notify::Result<NotifyEvent>>;

/// Lifecycle state of a [`WatchSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not observing
    Idle,
    /// Observation loop started
    Watching,
    /// Terminal; a new session is needed to watch again
    Stopped,
}

/// Handle to a running observation thread
struct ObservationLoop {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl ObservationLoop {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.thread.is_finished()
    }
}

/// Clears the liveness flag on every exit path of the observation thread
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Watches a workspace root and notifies subscribers of file changes
pub struct WatchSession {
    /// Canonicalized workspace root
    root: PathBuf,
    /// Configuration
    config: Arc<WatcherConfig>,
    /// Skip rules
    filter: PathFilter,
    /// Extensions that produce events
    tracked: TrackedExtensions,
    /// Subscribers, shared with the observation thread
    registry: Arc<SubscriberRegistry>,
    /// Lifecycle state
    state: SessionState,
    /// Running observation thread
    worker: Option<ObservationLoop>,
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("root", &self.root)
            .field("state", &self.state)
            .field("subscribers", &self.registry.total())
            .finish_non_exhaustive()
    }
}

impl WatchSession {
    /// Create an idle session for `root`
    ///
    /// The root is canonicalized when it exists. A missing root is accepted
    /// here and reported by [`WatchSession::start`].
    pub fn new(root: impl AsRef<Path>, config: WatcherConfig) -> Result<Self> {
        config.validate()?;

        let root = root.as_ref();
        let root = match root.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!("Cannot canonicalize workspace root {root:?}: {e}");
                std::path::absolute(root).context("Failed to resolve workspace root")?
            }
        };

        Ok(Self {
            filter: PathFilter::new(&config.skip_patterns),
            tracked: TrackedExtensions::new(&config.tracked_extensions),
            root,
            config: Arc::new(config),
            registry: Arc::new(SubscriberRegistry::new()),
            state: SessionState::Idle,
            worker: None,
        })
    }

    /// Start observing the workspace root recursively
    ///
    /// With `scheduler` set, scheduled-mode subscribers are spawned onto that
    /// runtime; otherwise every subscriber runs inline on the observation
    /// thread.
    pub fn start(&mut self, scheduler: Option<Handle>) -> Result<()> {
        self.start_with(scheduler, create_notify_watcher)
    }

    /// Start the observation loop with `connect` wiring a signal source to
    /// the loop's channel
    ///
    /// The value `connect` returns is owned by the observation thread and
    /// dropped when the loop exits.
    fn start_with<F, S>(&mut self, scheduler: Option<Handle>, connect: F) -> Result<()>
    where
        F: FnOnce(&Path, SignalSender) -> Result<S> + Send + 'static,
    {
        match self.state {
            SessionState::Watching => return Err(Error::AlreadyWatching),
            SessionState::Stopped => return Err(Error::SessionStopped),
            SessionState::Idle => {}
        }

        if !self.root.is_dir() {
            return Err(Error::invalid_root(&self.root));
        }

        let pipeline = SignalPipeline::new(
            self.root.clone(),
            self.filter.clone(),
            self.tracked.clone(),
            DebounceTracker::new(self.config.debounce_duration()),
            Dispatcher::new(Arc::clone(&self.registry), scheduler),
        );

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let alive = Arc::new(AtomicBool::new(true));

        let thread = {
            let root = self.root.clone();
            let queue_size = self.config.max_queue_size;
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name("livewatch-observer".to_string())
                .spawn(move || {
                    run_observation_loop(
                        root, queue_size, connect, pipeline, stop_rx, ready_tx, alive,
                    )
                })
                .map_err(|e| Error::watcher(format!("Failed to spawn observation thread: {e}")))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::watcher(
                    "Observation thread exited before the watch was registered",
                ));
            }
        }

        self.worker = Some(ObservationLoop {
            stop_tx,
            thread,
            alive,
        });
        self.state = SessionState::Watching;
        info!("Watch session started for {:?}", self.root);
        Ok(())
    }

    /// Stop observing and release the OS watch handle
    ///
    /// Blocks until the observation thread has exited. Scheduled deliveries
    /// already posted to the runtime are not cancelled. No-op unless the
    /// session is watching.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != SessionState::Watching {
            return Ok(());
        }
        self.state = SessionState::Stopped;

        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // Fails only if the loop already exited on its own
        let _ = worker.stop_tx.try_send(());
        if worker.thread.join().is_err() {
            return Err(Error::watcher("Observation thread panicked"));
        }

        info!("Watch session stopped for {:?}", self.root);
        Ok(())
    }

    /// True while the session is watching and its observation loop is alive
    pub fn is_watching(&self) -> bool {
        self.state == SessionState::Watching
            && self.worker.as_ref().is_some_and(ObservationLoop::is_alive)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Canonicalized workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session configuration
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Register a subscriber; allowed in any state
    pub fn subscribe<C>(&self, category: C, subscriber: Subscriber) -> Result<SubscriptionId>
    where
        C: TryInto<EventCategory>,
        Error: From<C::Error>,
    {
        self.registry.subscribe(category, subscriber)
    }

    /// Remove a subscriber; `Ok(false)` if it was not registered
    pub fn unsubscribe<C>(&self, category: C, id: SubscriptionId) -> Result<bool>
    where
        C: TryInto<EventCategory>,
        Error: From<C::Error>,
    {
        self.registry.unsubscribe(category, id)
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error stopping watch session on drop: {e}");
        }
    }
}

/// Create the notify watcher feeding `tx` and register `root` recursively
fn create_notify_watcher(root: &Path, tx: SignalSender) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<NotifyEvent>| match tx.try_send(res) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Event queue full, dropping file system signal"),
            // Observation loop has exited
            Err(TrySendError::Disconnected(_)) => {}
        },
        NotifyConfig::default(),
    )
    .map_err(|e| Error::watcher(format!("Failed to create watcher: {e}")))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| Error::watcher(format!("Failed to watch path {root:?}: {e}")))?;

    info!("Watching path: {root:?} (recursive: true)");
    Ok(watcher)
}

fn run_observation_loop<F, S>(
    root: PathBuf,
    queue_size: usize,
    connect: F,
    mut pipeline: SignalPipeline,
    stop_rx: Receiver<()>,
    ready_tx: Sender<Result<()>>,
    alive: Arc<AtomicBool>,
) where
    F: FnOnce(&Path, SignalSender) -> Result<S>,
{
    let _alive = AliveGuard(alive);
    let (signal_tx, signal_rx) = bounded(queue_size);

    let source = match connect(&root, signal_tx) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to start observation loop: {e}");
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    loop {
        // Fires when the oldest unpaired rename half is due
        let rename_due = pipeline.next_deadline().map_or_else(never, at);

        select! {
            recv(stop_rx) -> _ => {
                debug!("Observation loop received stop request");
                break;
            }
            recv(signal_rx) -> msg => match msg {
                Ok(Ok(event)) => {
                    let signal = RawSignal::from_notify(&event);
                    pipeline.process(&signal, Instant::now());
                }
                Ok(Err(e)) => {
                    error!("File watcher failed, terminating observation loop: {e}");
                    break;
                }
                Err(_) => {
                    error!("Notifier channel disconnected, terminating observation loop");
                    break;
                }
            },
            recv(rename_due) -> _ => {
                pipeline.flush_expired(Instant::now());
            }
        }
    }

    drop(source);
    debug!("Observation loop for {root:?} exited");
}
