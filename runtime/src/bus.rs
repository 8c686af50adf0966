//! The four domain events: Created and Changed, for orders and for feedback.
//!
//! Producers publish after their own persistence step has committed. The
//! payload is a full snapshot of the request at that point.

use crate::event::Event;
use crate::pool::TaskPool;
use storefront_sync_core::request::{RequestKind, ServiceRequest};

/// Typed event kinds for every (entity kind × {Created, Changed}) pair.
#[derive(Debug)]
pub struct EventBus {
    order_created: Event<ServiceRequest>,
    order_changed: Event<ServiceRequest>,
    feedback_created: Event<ServiceRequest>,
    feedback_changed: Event<ServiceRequest>,
}

impl EventBus {
    /// Create the four event kinds, all delivering through `pool`.
    #[must_use]
    pub fn new(pool: &TaskPool) -> Self {
        Self {
            order_created: Event::new("order_created", pool.clone()),
            order_changed: Event::new("order_changed", pool.clone()),
            feedback_created: Event::new("feedback_created", pool.clone()),
            feedback_changed: Event::new("feedback_changed", pool.clone()),
        }
    }

    /// Fired once a new request of `kind` has been persisted.
    #[must_use]
    pub const fn created(&self, kind: RequestKind) -> &Event<ServiceRequest> {
        match kind {
            RequestKind::Order => &self.order_created,
            RequestKind::Feedback => &self.feedback_created,
        }
    }

    /// Fired once the status of a request of `kind` has been persisted.
    #[must_use]
    pub const fn changed(&self, kind: RequestKind) -> &Event<ServiceRequest> {
        match kind {
            RequestKind::Order => &self.order_changed,
            RequestKind::Feedback => &self.feedback_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pair_has_its_own_event() {
        let bus = EventBus::new(&TaskPool::new(1, 1));
        let names: Vec<_> = RequestKind::ALL
            .into_iter()
            .flat_map(|kind| [bus.created(kind).name(), bus.changed(kind).name()])
            .collect();

        assert_eq!(
            names,
            ["order_created", "order_changed", "feedback_created", "feedback_changed"]
        );
    }

    #[test]
    fn subscriptions_do_not_leak_across_kinds() {
        let bus = EventBus::new(&TaskPool::new(1, 1));
        let _subscription = bus
            .changed(RequestKind::Feedback)
            .subscribe(|_, _| async { Ok(()) });

        assert_eq!(bus.changed(RequestKind::Feedback).subscriber_count(), 1);
        assert_eq!(bus.changed(RequestKind::Order).subscriber_count(), 0);
        assert_eq!(bus.created(RequestKind::Feedback).subscriber_count(), 0);
    }
}
