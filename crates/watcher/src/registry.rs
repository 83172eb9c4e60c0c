//! Subscriber registration keyed by event category
//!
//! Each category keeps its subscribers in registration order. Readers get a
//! snapshot, so subscribe/unsubscribe from other threads never disturbs a
//! delivery that is already iterating.

use crate::events::{EventCategory, FileChangeEvent};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use livewatch_core::error::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type DirectFn = dyn Fn(&FileChangeEvent) -> anyhow::Result<()> + Send + Sync;
type ScheduledFn = dyn Fn(FileChangeEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// How a subscriber is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Called inline on the observation thread
    Direct,
    /// Posted as a task onto the session's runtime, if one was supplied
    Scheduled,
}

/// A registered callback together with its delivery mode
#[derive(Clone)]
pub enum Subscriber {
    Direct(Arc<DirectFn>),
    Scheduled(Arc<ScheduledFn>),
}

impl Subscriber {
    /// A callback invoked synchronously on the delivering thread
    pub fn direct<F>(callback: F) -> Self
    where
        F: Fn(&FileChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Direct(Arc::new(callback))
    }

    /// An async callback spawned onto the session's runtime
    ///
    /// When the session was started without a runtime handle, the future is
    /// run to completion on the observation thread inside a current-thread
    /// tokio runtime.
    pub fn scheduled<F, Fut>(callback: F) -> Self
    where
        F: Fn(FileChangeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Scheduled(Arc::new(move |event| callback(event).boxed()))
    }

    /// The delivery mode chosen at construction
    pub fn mode(&self) -> DeliveryMode {
        match self {
            Self::Direct(_) => DeliveryMode::Direct,
            Self::Scheduled(_) => DeliveryMode::Scheduled,
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber").field(&self.mode()).finish()
    }
}

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Category -> ordered subscribers
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: DashMap<EventCategory, Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for `category`
    ///
    /// `category` may be an [`EventCategory`] or a category name; unknown
    /// names fail with [`Error::InvalidCategory`].
    pub fn subscribe<C>(&self, category: C, subscriber: Subscriber) -> Result<SubscriptionId>
    where
        C: TryInto<EventCategory>,
        Error: From<C::Error>,
    {
        let category = category.try_into()?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        debug!(
            "Subscribing {id} to {category} ({:?} mode)",
            subscriber.mode()
        );
        self.entries
            .entry(category)
            .or_default()
            .push((id, subscriber));

        Ok(id)
    }

    /// Remove a subscription
    ///
    /// Returns `Ok(false)` if `id` was not subscribed to `category`.
    pub fn unsubscribe<C>(&self, category: C, id: SubscriptionId) -> Result<bool>
    where
        C: TryInto<EventCategory>,
        Error: From<C::Error>,
    {
        let category = category.try_into()?;

        let removed = match self.entries.get_mut(&category) {
            Some(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|(existing, _)| *existing != id);
                subscribers.len() != before
            }
            None => false,
        };

        if removed {
            debug!("Unsubscribed {id} from {category}");
        }
        Ok(removed)
    }

    /// Snapshot of the subscribers of `category` in registration order
    pub fn subscribers_of(&self, category: EventCategory) -> Vec<Subscriber> {
        self.entries
            .get(&category)
            .map(|subscribers| subscribers.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of subscribers of `category`
    pub fn len(&self, category: EventCategory) -> usize {
        self.entries.get(&category).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of subscriptions across all categories
    pub fn total(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    /// Remove every subscription
    pub fn clear(&self) {
        self.entries.clear();
    }
}
