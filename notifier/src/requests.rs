//! Producer side of the domain events.
//!
//! Request writes are authoritative: they persist first and only then
//! publish, under a detached context, so that a failing or slow
//! notification path never changes the outcome reported to the caller.

use std::sync::Arc;
use storefront_sync_core::environment::{Clock, Storage};
use storefront_sync_core::request::{NewServiceRequest, RequestKind, RequestStatus, ServiceRequest};
use storefront_sync_core::user::{User, UserRole};
use storefront_sync_core::{Context, StorageError, Uuid};
use storefront_sync_runtime::EventBus;
use thiserror::Error;

/// Errors from [`RequestService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The actor's role may not change statuses
    #[error("user {user_id} with role {role} may not change request statuses")]
    Forbidden {
        /// Acting user
        user_id: i64,
        /// Their role
        role: UserRole,
    },

    /// No such request
    #[error("{kind} {uuid} not found")]
    NotFound {
        /// Request kind
        kind: RequestKind,
        /// Public identifier
        uuid: Uuid,
    },

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(StorageError),
}

/// Creates requests and changes their status, then announces it.
pub struct RequestService {
    storage: Arc<dyn Storage>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl RequestService {
    /// Create a service writing to `storage` and publishing on `bus`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            bus,
            clock,
        }
    }

    /// Persist a new request and publish Created.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Storage`] if the insert fails; nothing is
    /// published then.
    pub async fn create(
        &self,
        ctx: &Context,
        kind: RequestKind,
        draft: &NewServiceRequest,
    ) -> Result<ServiceRequest, ServiceError> {
        let request = self
            .storage
            .create_request(kind, draft)
            .await
            .map_err(ServiceError::Storage)?;

        tracing::info!(kind = %kind, request_id = request.id, uuid = %request.uuid, "Request created");

        if let Err(e) = self
            .bus
            .created(kind)
            .publish(&ctx.detached(), request.clone())
            .await
        {
            tracing::warn!(kind = %kind, request_id = request.id, error = %e, "Failed to publish creation");
        }
        Ok(request)
    }

    /// Privileged status change, as done from the admin panel.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Forbidden`] unless `actor` is a manager, moderator
    ///   or admin
    /// - [`ServiceError::NotFound`] if no request has `uuid`
    /// - [`ServiceError::Storage`] if loading or saving fails
    pub async fn change_status(
        &self,
        ctx: &Context,
        actor: &User,
        kind: RequestKind,
        uuid: Uuid,
        status: RequestStatus,
    ) -> Result<ServiceRequest, ServiceError> {
        if !actor.has_any_role(&UserRole::REQUEST_MANAGERS) {
            return Err(ServiceError::Forbidden {
                user_id: actor.id,
                role: actor.role,
            });
        }

        let mut request = self
            .storage
            .load_request_by_uuid(kind, uuid)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => ServiceError::NotFound { kind, uuid },
                other => ServiceError::Storage(other),
            })?;

        request.transition(status, self.clock.now());
        self.storage
            .save_status(&request)
            .await
            .map_err(ServiceError::Storage)?;

        tracing::info!(
            kind = %kind,
            request_id = request.id,
            status = %status,
            user_id = actor.id,
            "Status changed"
        );

        if let Err(e) = self
            .bus
            .changed(kind)
            .publish(&ctx.detached(), request.clone())
            .await
        {
            tracing::warn!(kind = %kind, request_id = request.id, error = %e, "Failed to publish status change");
        }
        Ok(request)
    }
}

impl std::fmt::Debug for RequestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestService").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storefront_sync_runtime::TaskPool;
    use storefront_sync_testing::mocks::epoch;
    use storefront_sync_testing::{FixedClock, InMemoryStorage, PoolHarness, eventually, fixtures};

    fn service(storage: &InMemoryStorage, bus: Arc<EventBus>) -> RequestService {
        let an_hour_later = FixedClock::new(epoch() + chrono::Duration::hours(1));
        RequestService::new(Arc::new(storage.clone()), bus, Arc::new(an_hour_later))
    }

    #[tokio::test]
    async fn managers_move_requests_and_changes_are_announced() {
        let harness = PoolHarness::default();
        let bus = Arc::new(EventBus::new(harness.pool()));
        let seen = Arc::new(AtomicUsize::new(0));
        let _subscription = bus.changed(RequestKind::Order).subscribe({
            let seen = Arc::clone(&seen);
            move |_, request: Arc<ServiceRequest>| {
                let seen = Arc::clone(&seen);
                async move {
                    assert_eq!(request.status, RequestStatus::Reviewed);
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        });

        let storage = InMemoryStorage::new();
        let order = fixtures::order(5, RequestStatus::Created);
        storage.insert_request(order.clone());
        let manager = fixtures::user(1, 100, UserRole::Manager);

        let updated = service(&storage, bus)
            .change_status(
                &Context::background(),
                &manager,
                RequestKind::Order,
                order.uuid,
                RequestStatus::Reviewed,
            )
            .await
            .unwrap();

        assert_eq!(updated.status, RequestStatus::Reviewed);
        assert!(updated.updated_at > order.updated_at);
        assert_eq!(
            storage.request(RequestKind::Order, 5).unwrap().status,
            RequestStatus::Reviewed
        );
        assert!(eventually(|| seen.load(Ordering::SeqCst) == 1).await);
        harness.stop().await;
    }

    #[tokio::test]
    async fn customers_are_forbidden() {
        let storage = InMemoryStorage::new();
        let order = fixtures::order(5, RequestStatus::Created);
        storage.insert_request(order.clone());
        let bus = Arc::new(EventBus::new(&TaskPool::new(1, 1)));

        let err = service(&storage, bus)
            .change_status(
                &Context::background(),
                &fixtures::user(2, 200, UserRole::User),
                RequestKind::Order,
                order.uuid,
                RequestStatus::Reviewed,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Forbidden { user_id: 2, .. }));
        assert_eq!(storage.status_writes(), 0);
    }

    #[tokio::test]
    async fn unknown_uuid_is_not_found() {
        let storage = InMemoryStorage::new();
        let bus = Arc::new(EventBus::new(&TaskPool::new(1, 1)));
        let uuid = Uuid::nil();

        let err = service(&storage, bus)
            .change_status(
                &Context::background(),
                &fixtures::user(1, 100, UserRole::Admin),
                RequestKind::Feedback,
                uuid,
                RequestStatus::InProgress,
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ServiceError::NotFound {
                kind: RequestKind::Feedback,
                uuid
            }
        );
    }

    #[tokio::test]
    async fn creation_succeeds_even_if_the_pool_is_gone() {
        let storage = InMemoryStorage::new();
        let harness = PoolHarness::start(1, 1);
        let bus = Arc::new(EventBus::new(harness.pool()));
        let _subscription = bus
            .created(RequestKind::Feedback)
            .subscribe(|_, _| async { Ok(()) });
        harness.stop().await;

        let created = service(&storage, bus)
            .create(
                &Context::background(),
                RequestKind::Feedback,
                &fixtures::draft(RequestKind::Feedback),
            )
            .await
            .unwrap();

        assert_eq!(created.status, RequestStatus::Created);
        assert!(storage.request(RequestKind::Feedback, created.id).is_some());
    }
}
