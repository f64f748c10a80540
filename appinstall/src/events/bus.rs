//! Observer registry with synchronous fan-out.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::event::InstallEvent;
use crate::manager::AppId;

/// Callback invoked for each matching event.
pub type EventHandler = Arc<dyn Fn(&InstallEvent) + Send + Sync>;

/// Which events a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every event for every application.
    All,
    /// Only events about one application.
    App(AppId),
}

impl Topic {
    fn matches(&self, event: &InstallEvent) -> bool {
        match self {
            Topic::All => true,
            Topic::App(id) => event.id() == id,
        }
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
}

/// Fan-out of install events to UI collaborators.
///
/// Handlers run on the publishing task, in subscription order. A panicking
/// handler is logged and skipped; later handlers still receive the event.
/// Handlers must not block on network I/O.
///
/// Cloning the bus shares the subscriber registry.
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl NotificationBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&InstallEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().push(Subscriber {
            id,
            topic,
            handler: Arc::new(handler),
        });
        id
    }

    /// Subscribe through an unbounded channel.
    ///
    /// Convenient for async consumers. Events published after the receiver is
    /// dropped are discarded.
    pub fn subscribe_channel(
        &self,
        topic: Topic,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<InstallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(topic, move |event| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Number of registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn publish(&self, event: InstallEvent) -> usize {
        // Snapshot so handlers can subscribe or unsubscribe re-entrantly.
        let handlers: Vec<(SubscriptionId, EventHandler)> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|s| s.topic.matches(&event))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut delivered = 0;
        for (id, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(
                        subscription = ?id,
                        event = event.name(),
                        app = %event.id(),
                        "Event handler panicked; continuing delivery"
                    );
                }
            }
        }
        delivered
    }
}
