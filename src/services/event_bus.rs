//! Event bus (C5, §4.1): a bounded, priority-ordered publish/subscribe hub.
//!
//! Grounded on the teacher's `event_reactor.rs` handler/priority/filter shape,
//! adapted from its broadcast-replay model to a single bounded FIFO queue with
//! explicit backpressure and a `Stopped -> Running -> Draining -> Stopped`
//! lifecycle (§4.1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::domain::errors::{BusError, CoreError};
use crate::domain::models::event::Event;
use crate::domain::models::subscription::{EventFilter, Subscription};

/// A registered event consumer. Implementations must not block; long work
/// should hand off to its own task.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Stopped,
    Running,
    Draining,
}

#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    pub published: u64,
    pub dispatched: u64,
    pub dropped_queue_full: u64,
    pub subscriber_count: usize,
    pub queue_depth: usize,
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub queue_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { queue_capacity: 1024 }
    }
}

struct Registered {
    subscription: Subscription,
    handler: Arc<dyn EventHandler>,
}

struct Inner {
    subscriptions: RwLock<HashMap<u64, Registered>>,
    next_sub_id: AtomicU64,
    sender: RwLock<Option<mpsc::Sender<Event>>>,
    state: RwLock<BusState>,
    stats: RwLock<EventBusStats>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    queue_capacity: usize,
}

/// Bounded FIFO event hub (§4.1). Events are dispatched to matching
/// subscribers in priority-descending, insertion-stable order, in parallel,
/// with each subscriber's handler error isolated from the rest.
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscriptions: RwLock::new(HashMap::new()),
                next_sub_id: AtomicU64::new(1),
                sender: RwLock::new(None),
                state: RwLock::new(BusState::Stopped),
                stats: RwLock::new(EventBusStats::default()),
                dispatch_task: Mutex::new(None),
                queue_capacity: config.queue_capacity,
            }),
        }
    }

    /// Registers a handler. Returns the subscription id used for `unsubscribe`.
    pub async fn subscribe(
        &self,
        kinds: impl IntoIterator<Item = String>,
        filter: EventFilter,
        priority: i32,
        handler: Arc<dyn EventHandler>,
    ) -> u64 {
        let id = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let subscription = Subscription {
            id,
            kinds: kinds.into_iter().collect(),
            filter,
            priority,
            created_at: chrono::Utc::now(),
        };
        self.inner
            .subscriptions
            .write()
            .await
            .insert(id, Registered { subscription, handler });
        id
    }

    /// Idempotent: unsubscribing an unknown or already-removed id is a no-op.
    /// Returns whether a subscription was actually present and removed.
    pub async fn unsubscribe(&self, id: u64) -> bool {
        self.inner.subscriptions.write().await.remove(&id).is_some()
    }

    pub async fn start(&self) {
        let mut state = self.inner.state.write().await;
        if *state != BusState::Stopped {
            return;
        }
        let (tx, mut rx) = mpsc::channel::<Event>(self.inner.queue_capacity);
        *self.inner.sender.write().await = Some(tx);
        *state = BusState::Running;
        drop(state);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                Self::dispatch_one(&inner, event).await;
            }
        });
        *self.inner.dispatch_task.lock().await = Some(handle);
    }

    /// Stops accepting new publishes, drains the queue, then halts dispatch.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.write().await;
            if *state != BusState::Running {
                return;
            }
            *state = BusState::Draining;
        }
        // Dropping the sender closes the channel; the dispatch loop drains
        // remaining buffered events, then its `recv` returns `None`.
        self.inner.sender.write().await.take();
        if let Some(handle) = self.inner.dispatch_task.lock().await.take() {
            let _ = handle.await;
        }
        *self.inner.state.write().await = BusState::Stopped;
    }

    /// Enqueues `event`. Fails with `QueueFull` rather than blocking (§4.1).
    pub async fn publish(&self, event: Event) -> Result<(), BusError> {
        let sender = self.inner.sender.read().await.clone();
        let Some(sender) = sender else {
            return Err(BusError::QueueFull);
        };
        match sender.try_send(event) {
            Ok(()) => {
                let mut stats = self.inner.stats.write().await;
                stats.published += 1;
                Ok(())
            }
            Err(_) => {
                self.inner.stats.write().await.dropped_queue_full += 1;
                Err(BusError::QueueFull)
            }
        }
    }

    pub async fn stats(&self) -> EventBusStats {
        let mut stats = self.inner.stats.read().await.clone();
        stats.subscriber_count = self.inner.subscriptions.read().await.len();
        stats
    }

    async fn dispatch_one(inner: &Arc<Inner>, event: Event) {
        let mut matching: Vec<(u64, i32, chrono::DateTime<chrono::Utc>, Arc<dyn EventHandler>)> = {
            let subs = inner.subscriptions.read().await;
            subs.values()
                .filter(|registered| registered.subscription.matches(&event))
                .map(|registered| {
                    (
                        registered.subscription.id,
                        registered.subscription.priority,
                        registered.subscription.created_at,
                        Arc::clone(&registered.handler),
                    )
                })
                .collect()
        };
        // Priority-descending, stable on insertion order (created_at, then id)
        // for ties.
        matching.sort_by(|a, b| {
            b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)).then_with(|| a.0.cmp(&b.0))
        });

        let event = Arc::new(event);
        let mut tasks = Vec::with_capacity(matching.len());
        for (id, _, _, handler) in matching {
            let event = Arc::clone(&event);
            tasks.push(tokio::spawn(async move {
                if let Err(err) = handler.handle(&event).await {
                    warn!(subscription_id = id, error = %err, "event handler failed");
                }
                id
            }));
        }
        for task in tasks {
            if let Err(join_err) = task.await {
                error!(error = %join_err, "event handler task panicked");
            }
        }

        let mut stats = inner.stats.write().await;
        stats.dispatched += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::{EventPayload, EventSeverity, FileEvent, FileOperation};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        notify: Arc<Notify>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) -> Result<(), CoreError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
            Ok(())
        }
    }

    fn file_event() -> Event {
        Event::new(
            "e1",
            0,
            "watcher",
            EventSeverity::Info,
            EventPayload::File(FileEvent::new(FileOperation::Save, "a.rs", None)),
        )
    }

    #[tokio::test]
    async fn publish_dispatches_to_matching_subscriber() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.start().await;

        let count = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let handler = Arc::new(CountingHandler {
            count: Arc::clone(&count),
            notify: Arc::clone(&notify),
        });
        bus.subscribe([], EventFilter::default(), 0, handler).await;

        bus.publish(file_event()).await.unwrap();
        notify.notified().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        bus.stop().await;
    }

    #[tokio::test]
    async fn publish_before_start_returns_queue_full() {
        let bus = EventBus::new(EventBusConfig::default());
        let err = bus.publish(file_event()).await.unwrap_err();
        assert_eq!(err, BusError::QueueFull);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = EventBus::new(EventBusConfig::default());
        assert!(!bus.unsubscribe(999).await);

        let count = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let handler = Arc::new(CountingHandler {
            count: Arc::clone(&count),
            notify: Arc::clone(&notify),
        });
        let id = bus.subscribe([], EventFilter::default(), 0, handler).await;
        assert!(bus.unsubscribe(id).await);
        assert!(!bus.unsubscribe(id).await);
    }
}
