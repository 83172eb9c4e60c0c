//! Event delivery to registered subscribers
//!
//! Direct subscribers run inline on the observation thread. Scheduled
//! subscribers are spawned onto a tokio runtime through its `Handle`, which is
//! the runtime's thread-safe entry point for foreign threads. Without a
//! handle, scheduled subscribers are driven to completion inline on a
//! current-thread runtime owned by the dispatcher, so tokio timers, channels
//! and `spawn` keep working.
//!
//! A failing subscriber (error or panic) is logged and skipped; it never stops
//! delivery to the others and never reaches the observation loop.

use crate::events::{EventCategory, FileChangeEvent};
use crate::registry::{Subscriber, SubscriberRegistry};
use futures::FutureExt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error};

/// Outcome of a single `dispatch` call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that completed inline without error
    pub delivered: usize,
    /// Subscribers posted onto the runtime
    pub scheduled: usize,
    /// Subscribers that failed inline
    pub failed: usize,
}

/// Delivers events to the subscribers of a category
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SubscriberRegistry>,
    scheduler: Option<Handle>,
    /// Built on first inline scheduled delivery; `None` if building failed
    inline_runtime: Arc<OnceLock<Option<Runtime>>>,
}

impl Dispatcher {
    /// Create a dispatcher reading from `registry`
    ///
    /// With `scheduler` set, scheduled-mode subscribers are spawned onto it.
    pub fn new(registry: Arc<SubscriberRegistry>, scheduler: Option<Handle>) -> Self {
        Self {
            registry,
            scheduler,
            inline_runtime: Arc::new(OnceLock::new()),
        }
    }

    /// Whether a runtime was supplied for scheduled delivery
    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Deliver `event` to every subscriber of `category`
    pub fn dispatch(&self, category: EventCategory, event: &FileChangeEvent) -> DispatchReport {
        let subscribers = self.registry.subscribers_of(category);
        let mut report = DispatchReport::default();

        debug!(
            "Dispatching {category} for {:?} to {} subscriber(s)",
            event.relative_path,
            subscribers.len()
        );

        for subscriber in subscribers {
            match (subscriber, &self.scheduler) {
                (Subscriber::Scheduled(callback), Some(handle)) => {
                    // The callback may panic before handing back its future
                    let future =
                        match panic::catch_unwind(AssertUnwindSafe(|| callback(event.clone()))) {
                            Ok(future) => future,
                            Err(payload) => {
                                log_failure(
                                    category,
                                    &event.relative_path,
                                    &panic_message(payload.as_ref()),
                                );
                                report.failed += 1;
                                continue;
                            }
                        };
                    let task = AssertUnwindSafe(future).catch_unwind();
                    let path = event.relative_path.clone();
                    handle.spawn(async move {
                        match task.await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => log_failure(category, &path, &format!("{e:#}")),
                            Err(payload) => log_failure(category, &path, &panic_message(payload.as_ref())),
                        }
                    });
                    report.scheduled += 1;
                }
                (Subscriber::Scheduled(callback), None) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        let future = callback(event.clone());
                        match self.inline_runtime() {
                            Some(runtime) => runtime.block_on(future),
                            None => futures::executor::block_on(future),
                        }
                    }));
                    Self::record(&mut report, category, event, outcome);
                }
                (Subscriber::Direct(callback), _) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
                    Self::record(&mut report, category, event, outcome);
                }
            }
        }

        report
    }

    fn inline_runtime(&self) -> Option<&Runtime> {
        self.inline_runtime
            .get_or_init(|| {
                match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => Some(runtime),
                    Err(e) => {
                        error!("Failed to build runtime for inline scheduled delivery: {e}");
                        None
                    }
                }
            })
            .as_ref()
    }

    fn record(
        report: &mut DispatchReport,
        category: EventCategory,
        event: &FileChangeEvent,
        outcome: std::thread::Result<anyhow::Result<()>>,
    ) {
        match outcome {
            Ok(Ok(())) => report.delivered += 1,
            Ok(Err(e)) => {
                log_failure(category, &event.relative_path, &format!("{e:#}"));
                report.failed += 1;
            }
            Err(payload) => {
                log_failure(category, &event.relative_path, &panic_message(payload.as_ref()));
                report.failed += 1;
            }
        }
    }
}

fn log_failure(category: EventCategory, path: &str, detail: &str) {
    error!(
        category = %category,
        path = %path,
        "Subscriber failed: {detail}"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn counting(counter: &Arc<AtomicUsize>) -> Subscriber {
        let counter = Arc::clone(counter);
        Subscriber::direct(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn modified(path: &str) -> FileChangeEvent {
        FileChangeEvent::new(path, ChangeType::Modified)
    }

    #[test]
    fn test_direct_delivery_reaches_every_subscriber() {
        let registry = Arc::new(SubscriberRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            registry
                .subscribe(EventCategory::FileChanged, counting(&counter))
                .expect("subscribe");
        }

        let dispatcher = Dispatcher::new(Arc::clone(&registry), None);
        let report = dispatcher.dispatch(EventCategory::FileChanged, &modified("a.py"));

        assert_eq!(report.delivered, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_other_categories_are_not_notified() {
        let registry = Arc::new(SubscriberRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .subscribe(EventCategory::FileCreated, counting(&counter))
            .expect("subscribe");

        let dispatcher = Dispatcher::new(Arc::clone(&registry), None);
        let report = dispatcher.dispatch(EventCategory::FileChanged, &modified("a.py"));

        assert_eq!(report, DispatchReport::default());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_subscribers_do_not_stop_delivery() {
        let registry = Arc::new(SubscriberRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));

        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::direct(|_| Err(anyhow::anyhow!("boom"))),
            )
            .expect("subscribe");
        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::direct(|_| panic!("subscriber exploded")),
            )
            .expect("subscribe");
        registry
            .subscribe(EventCategory::FileChanged, counting(&counter))
            .expect("subscribe");

        let dispatcher = Dispatcher::new(Arc::clone(&registry), None);
        let report = dispatcher.dispatch(EventCategory::FileChanged, &modified("a.py"));

        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scheduled_without_runtime_runs_inline() {
        let registry = Arc::new(SubscriberRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::scheduled(move |event: FileChangeEvent| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock().expect("lock").push(event.relative_path);
                        anyhow::Ok(())
                    }
                }),
            )
            .expect("subscribe");

        let dispatcher = Dispatcher::new(Arc::clone(&registry), None);
        let report = dispatcher.dispatch(EventCategory::FileChanged, &modified("pkg/b.py"));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.scheduled, 0);
        assert_eq!(*seen.lock().expect("lock"), vec!["pkg/b.py".to_string()]);
    }

    #[test]
    fn test_scheduled_without_runtime_supports_tokio_futures() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::scheduled(move |event: FileChangeEvent| {
                    let tx = tx.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        let path = tokio::spawn(async move { event.relative_path }).await?;
                        tx.send(path)?;
                        anyhow::Ok(())
                    }
                }),
            )
            .expect("subscribe");

        let dispatcher = Dispatcher::new(Arc::clone(&registry), None);
        let report = dispatcher.dispatch(EventCategory::FileChanged, &modified("timed.py"));
        let again = dispatcher.dispatch(EventCategory::FileChanged, &modified("again.py"));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(again.delivered, 1);
        assert_eq!(rx.try_recv().expect("first"), "timed.py");
        assert_eq!(rx.try_recv().expect("second"), "again.py");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduled_callback_panicking_before_its_future_is_isolated() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::scheduled(|event: FileChangeEvent| {
                    assert!(event.relative_path.is_empty(), "eager failure");
                    async { anyhow::Ok(()) }
                }),
            )
            .expect("subscribe");
        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::scheduled(move |event: FileChangeEvent| {
                    let tx = tx.clone();
                    async move {
                        tx.send(event.relative_path)?;
                        anyhow::Ok(())
                    }
                }),
            )
            .expect("subscribe");

        let dispatcher = Dispatcher::new(Arc::clone(&registry), Some(Handle::current()));
        let event = modified("d.py");
        let report = std::thread::spawn(move || {
            dispatcher.dispatch(EventCategory::FileChanged, &event)
        })
        .join()
        .expect("dispatch thread must survive a panicking subscriber");

        assert_eq!(report.failed, 1);
        assert_eq!(report.scheduled, 1);
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(received, "d.py");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduled_with_runtime_is_spawned() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::scheduled(move |event: FileChangeEvent| {
                    let tx = tx.clone();
                    async move {
                        tx.send(event.relative_path)?;
                        anyhow::Ok(())
                    }
                }),
            )
            .expect("subscribe");
        registry
            .subscribe(
                EventCategory::FileChanged,
                Subscriber::scheduled(|_| async {
                    Err::<(), _>(anyhow::anyhow!("async failure"))
                }),
            )
            .expect("subscribe");

        let dispatcher = Dispatcher::new(Arc::clone(&registry), Some(Handle::current()));
        assert!(dispatcher.has_scheduler());

        // Dispatch from a foreign OS thread, as the observation loop does
        let event = modified("c.py");
        let report = std::thread::spawn(move || {
            dispatcher.dispatch(EventCategory::FileChanged, &event)
        })
        .join()
        .expect("dispatch thread panicked");

        assert_eq!(report.scheduled, 2);
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(received, "c.py");
    }
}
