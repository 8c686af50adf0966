//! Typed publish/subscribe channel fanned out through the [`TaskPool`].
//!
//! Each [`Event<T>`] owns its own subscriber registry: a map from a
//! monotonically increasing subscription id to a handler. The map is only
//! touched under its lock for the map operation itself. Publishing copies
//! the handlers out under a read lock, drops the lock, and then submits one
//! pool task per handler, so registration never waits on delivery and
//! delivery never waits on registration.
//!
//! Delivery guarantees:
//!
//! - a handler subscribed before [`Event::publish`] is scheduled exactly once
//!   for that publication;
//! - a handler subscribed after `publish` returns does not see it;
//! - [`Subscription::unsubscribe`] only affects future publications;
//! - handlers run concurrently and in no particular order, and their errors
//!   are logged by the pool, never reported back to the publisher.

use crate::pool::{PoolError, TaskPool};
use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use storefront_sync_core::Context;

type Handler<T> =
    Arc<dyn Fn(Context, Arc<T>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: BTreeMap<u64, Handler<T>>,
}

struct Subscribers<T> {
    registry: RwLock<Registry<T>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<T: Send + Sync + 'static> Detach for Subscribers<T> {
    fn detach(&self, id: u64) -> bool {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .remove(&id)
            .is_some()
    }
}

/// One kind of domain occurrence carrying a `T` payload.
pub struct Event<T> {
    name: &'static str,
    subscribers: Arc<Subscribers<T>>,
    pool: TaskPool,
}

impl<T: Send + Sync + 'static> Event<T> {
    /// Create an event kind delivering through `pool`.
    ///
    /// `name` labels log lines and metrics.
    #[must_use]
    pub fn new(name: &'static str, pool: TaskPool) -> Self {
        Self {
            name,
            subscribers: Arc::new(Subscribers {
                registry: RwLock::new(Registry {
                    next_id: 0,
                    handlers: BTreeMap::new(),
                }),
            }),
            pool,
        }
    }

    /// Name of this event kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    /// Register `handler` for every future publication.
    ///
    /// The returned [`Subscription`] is the only way to remove it again.
    /// Dropping the subscription leaves the handler registered.
    pub fn subscribe<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(Context, Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler<T> = Arc::new(move |ctx, payload| handler(ctx, payload).boxed());

        let id = {
            let mut registry = self
                .subscribers
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.insert(id, handler);
            id
        };

        tracing::debug!(event = self.name, subscription = id, "Handler subscribed");

        let subscribers: Arc<dyn Detach> = self.subscribers.clone();
        Subscription {
            event: self.name,
            id,
            subscribers: Arc::downgrade(&subscribers),
        }
    }

    /// Schedule every currently registered handler with `payload`.
    ///
    /// Returns the number of handlers scheduled. This waits for queue space
    /// when the pool is saturated, never for the handlers themselves.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if the pool has shut down. Handlers
    /// scheduled before the failure still run.
    pub async fn publish(&self, ctx: &Context, payload: T) -> Result<usize, PoolError> {
        let snapshot: Vec<Handler<T>> = self
            .subscribers
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .values()
            .cloned()
            .collect();

        let payload = Arc::new(payload);
        for handler in &snapshot {
            let handler = Arc::clone(handler);
            let ctx = ctx.clone();
            let payload = Arc::clone(&payload);
            self.pool
                .submit(async move { handler(ctx, payload).await })
                .await?;
        }

        counter!("event_hub_published_total", "event" => self.name).increment(1);
        tracing::debug!(
            event = self.name,
            handlers = snapshot.len(),
            request_id = ctx.request_id(),
            "Event published"
        );
        Ok(snapshot.len())
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Capability to remove one handler from one [`Event`].
pub struct Subscription {
    event: &'static str,
    id: u64,
    subscribers: Weak<dyn Detach>,
}

impl Subscription {
    /// Subscription id, unique within its event kind.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Name of the event kind this subscription belongs to.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        self.event
    }

    /// Remove the handler from future publications.
    ///
    /// Deliveries already scheduled by an earlier `publish` still run.
    /// Returns `false` if the handler was already gone.
    pub fn unsubscribe(self) -> bool {
        let removed = self
            .subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.detach(self.id));
        tracing::debug!(event = self.event, subscription = self.id, removed, "Handler unsubscribed");
        removed
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscription_ids_increase_monotonically() {
        let event: Event<u32> = Event::new("test", TaskPool::new(1, 1));
        let first = event.subscribe(|_, _| async { Ok(()) });
        let second = event.subscribe(|_, _| async { Ok(()) });

        assert!(second.id() > first.id());
        assert_eq!(event.subscriber_count(), 2);

        assert!(first.unsubscribe());
        let third = event.subscribe(|_, _| async { Ok(()) });
        assert!(third.id() > second.id());
    }

    #[test]
    fn unsubscribe_after_event_is_dropped_is_harmless() {
        let event: Event<u32> = Event::new("test", TaskPool::new(1, 1));
        let subscription = event.subscribe(|_, _| async { Ok(()) });
        drop(event);

        assert!(!subscription.unsubscribe());
    }

    #[tokio::test]
    async fn publish_schedules_without_running_inline() {
        let pool = TaskPool::new(1, 4);
        let event: Event<u32> = Event::new("test", pool.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let _subscription = event.subscribe({
            let calls = Arc::clone(&calls);
            move |_, _| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        });

        let scheduled = event.publish(&Context::background(), 7).await.unwrap();

        assert_eq!(scheduled, 1);
        assert_eq!(pool.queued(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_schedules_nothing() {
        let pool = TaskPool::new(1, 1);
        let event: Event<u32> = Event::new("test", pool.clone());

        assert_eq!(event.publish(&Context::background(), 1).await.unwrap(), 0);
        assert_eq!(pool.queued(), 0);
    }
}
