//! Status changes requested from the chat.
//!
//! A moderator presses a status button under a request's message. The
//! gateway hands the press over as an [`InboundAction`] and
//! [`ActionHandler`] runs, in order:
//!
//! 1. Resolve the pressing principal to a local user, creating an
//!    unprivileged one on first contact
//! 2. Check the user's role against the allow-list
//! 3. Parse the payload (`order_status:42:reviewed`)
//! 4. Load the request
//! 5. Apply and persist the new status
//! 6. Republish Changed with a detached context
//!
//! Every branch ends in exactly one [`Acknowledgment`] shown to the
//! principal. Only downstream failures are logged as errors.

use metrics::counter;
use std::sync::Arc;
use storefront_sync_core::callback::StatusCallback;
use storefront_sync_core::environment::{ActionSink, Clock, MessagingGateway, Storage};
use storefront_sync_core::request::{RequestKind, RequestStatus, ServiceRequest};
use storefront_sync_core::user::{InboundAction, NewUser, Principal, User, UserRole};
use storefront_sync_core::{Context, StorageError};
use storefront_sync_runtime::EventBus;
use thiserror::Error;

/// Short text shown to the principal once an action is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    /// The principal could not be resolved to a user
    Failed,
    /// The user's role is not allowed to act
    Unavailable,
    /// The payload is malformed
    Unparsable,
    /// The request does not exist
    NotFound(RequestKind),
    /// Loading the request failed
    LoadFailed(RequestKind),
    /// Persisting the new status failed
    UpdateFailed,
    /// The status was changed
    Updated(RequestStatus),
}

impl Acknowledgment {
    /// Text delivered to the principal.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Failed => "Failed to process action".to_string(),
            Self::Unavailable => "This action is unavailable to you".to_string(),
            Self::Unparsable => "Could not parse action data".to_string(),
            Self::NotFound(RequestKind::Order) => "Order not found".to_string(),
            Self::NotFound(RequestKind::Feedback) => "Feedback not found".to_string(),
            Self::LoadFailed(RequestKind::Order) => "Failed to get order".to_string(),
            Self::LoadFailed(RequestKind::Feedback) => "Failed to get feedback".to_string(),
            Self::UpdateFailed => "Failed to update status".to_string(),
            Self::Updated(status) => format!("Status: {}", status.label()),
        }
    }

    /// Metric label.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Failed => "principal_failed",
            Self::Unavailable => "unauthorized",
            Self::Unparsable => "unparsable",
            Self::NotFound(_) => "not_found",
            Self::LoadFailed(_) => "load_failed",
            Self::UpdateFailed => "update_failed",
            Self::Updated(_) => "updated",
        }
    }
}

/// Downstream failures while handling an action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The principal could not be looked up or created
    #[error("failed to resolve principal {external_id}: {source}")]
    Principal {
        /// Platform identifier of the principal
        external_id: i64,
        /// Storage failure
        source: StorageError,
    },

    /// The request could not be loaded
    #[error("failed to load {kind} {request_id}: {source}")]
    Load {
        /// Request kind
        kind: RequestKind,
        /// Request id
        request_id: i64,
        /// Storage failure
        source: StorageError,
    },

    /// The new status could not be persisted
    #[error("failed to update {kind} {request_id} status: {source}")]
    Persist {
        /// Request kind
        kind: RequestKind,
        /// Request id
        request_id: i64,
        /// Storage failure
        source: StorageError,
    },
}

impl ActionError {
    /// What the principal is told about this failure.
    #[must_use]
    pub const fn acknowledgment(&self) -> Acknowledgment {
        match self {
            Self::Principal { .. } => Acknowledgment::Failed,
            Self::Load { kind, .. } => Acknowledgment::LoadFailed(*kind),
            Self::Persist { .. } => Acknowledgment::UpdateFailed,
        }
    }
}

/// Applies status changes requested from the chat.
pub struct ActionHandler {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn MessagingGateway>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    allowed_roles: Vec<UserRole>,
}

impl ActionHandler {
    /// Create a handler accepting actions from users whose role is in
    /// `allowed_roles`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn MessagingGateway>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        allowed_roles: Vec<UserRole>,
    ) -> Self {
        Self {
            storage,
            gateway,
            bus,
            clock,
            allowed_roles,
        }
    }

    /// Find the local user behind `principal`, creating an unprivileged one
    /// if the principal was never seen.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the lookup or the insert fails.
    pub async fn resolve_principal(&self, principal: &Principal) -> Result<User, StorageError> {
        match self
            .storage
            .find_user_by_external_id(principal.external_id)
            .await
        {
            Err(StorageError::NotFound) => {}
            found => return found,
        }

        let draft = NewUser::from_principal(principal, self.clock.now());
        match self.storage.create_user(&draft).await {
            Ok(user) => {
                tracing::info!(
                    user_id = user.id,
                    external_id = principal.external_id,
                    "User created from chat principal"
                );
                Ok(user)
            }
            // Lost a race against a concurrent press by the same principal.
            Err(StorageError::Conflict(_)) => {
                self.storage
                    .find_user_by_external_id(principal.external_id)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Run an action to completion and decide its acknowledgment.
    ///
    /// Does not deliver the acknowledgment; see [`ActionSink::on_action`].
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] for downstream failures. Expected outcomes
    /// (unauthorized, malformed, not found) are `Ok` acknowledgments.
    pub async fn process(
        &self,
        ctx: &Context,
        action: &InboundAction,
    ) -> Result<Acknowledgment, ActionError> {
        let user = self
            .resolve_principal(&action.principal)
            .await
            .map_err(|source| ActionError::Principal {
                external_id: action.principal.external_id,
                source,
            })?;

        if !user.has_any_role(&self.allowed_roles) {
            tracing::info!(user_id = user.id, role = %user.role, "Action denied");
            return Ok(Acknowledgment::Unavailable);
        }

        let callback = match action.payload.parse::<StatusCallback>() {
            Ok(callback) => callback,
            Err(e) => {
                tracing::debug!(payload = %action.payload, error = %e, "Unparsable action payload");
                return Ok(Acknowledgment::Unparsable);
            }
        };

        let mut request = match self
            .storage
            .load_request(callback.kind, callback.request_id)
            .await
        {
            Ok(request) => request,
            Err(StorageError::NotFound) => {
                tracing::debug!(
                    kind = %callback.kind,
                    request_id = callback.request_id,
                    "Action on unknown request"
                );
                return Ok(Acknowledgment::NotFound(callback.kind));
            }
            Err(source) => {
                return Err(ActionError::Load {
                    kind: callback.kind,
                    request_id: callback.request_id,
                    source,
                });
            }
        };

        request.transition(callback.status, self.clock.now());
        self.storage
            .save_status(&request)
            .await
            .map_err(|source| ActionError::Persist {
                kind: request.kind,
                request_id: request.id,
                source,
            })?;

        tracing::info!(
            kind = %request.kind,
            request_id = request.id,
            status = %request.status,
            user_id = user.id,
            "Status changed from chat"
        );

        self.publish_changed(ctx, request).await;
        Ok(Acknowledgment::Updated(callback.status))
    }

    async fn publish_changed(&self, ctx: &Context, request: ServiceRequest) {
        let kind = request.kind;
        let request_id = request.id;
        if let Err(e) = self.bus.changed(kind).publish(&ctx.detached(), request).await {
            tracing::warn!(kind = %kind, request_id, error = %e, "Failed to publish status change");
        }
    }
}

#[async_trait::async_trait]
impl ActionSink for ActionHandler {
    #[tracing::instrument(
        skip(self, ctx, action),
        fields(action_id = %action.id, external_id = action.principal.external_id)
    )]
    async fn on_action(&self, ctx: Context, action: InboundAction) {
        let acknowledgment = match self.process(&ctx, &action).await {
            Ok(acknowledgment) => acknowledgment,
            Err(e) => {
                tracing::error!(error = %e, "Failed to handle action");
                e.acknowledgment()
            }
        };
        counter!("actions_processed_total", "outcome" => acknowledgment.outcome()).increment(1);

        if let Err(e) = self
            .gateway
            .answer_action(&ctx, &action.id, &acknowledgment.text())
            .await
        {
            tracing::warn!(error = %e, "Failed to answer action");
        }
    }
}

impl std::fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandler")
            .field("allowed_roles", &self.allowed_roles)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use storefront_sync_runtime::TaskPool;
    use storefront_sync_testing::{InMemoryStorage, RecordingGateway, fixtures, test_clock};

    fn handler(storage: &InMemoryStorage, gateway: &RecordingGateway) -> ActionHandler {
        ActionHandler::new(
            Arc::new(storage.clone()),
            Arc::new(gateway.clone()),
            Arc::new(EventBus::new(&TaskPool::new(1, 8))),
            Arc::new(test_clock()),
            UserRole::MODERATORS.to_vec(),
        )
    }

    #[test]
    fn acknowledgment_texts() {
        assert_eq!(
            Acknowledgment::Updated(RequestStatus::Reviewed).text(),
            "Status: Done"
        );
        assert_eq!(
            Acknowledgment::NotFound(RequestKind::Feedback).text(),
            "Feedback not found"
        );
        assert!(Acknowledgment::Unavailable.text().contains("unavailable"));
    }

    #[tokio::test]
    async fn unseen_principals_become_unprivileged_users() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        let handler = handler(&storage, &gateway);

        let first = handler.resolve_principal(&fixtures::principal(900)).await.unwrap();
        let again = handler.resolve_principal(&fixtures::principal(900)).await.unwrap();

        assert_eq!(first.role, UserRole::User);
        assert_eq!(first.id, again.id);
        assert_eq!(storage.users().len(), 1);
    }

    #[tokio::test]
    async fn authorization_precedes_parsing() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();

        let ack = handler(&storage, &gateway)
            .process(&Context::background(), &fixtures::action(900, "garbage"))
            .await
            .unwrap();

        assert_eq!(ack, Acknowledgment::Unavailable);
    }

    #[tokio::test]
    async fn load_failures_are_errors_with_an_acknowledgment() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        storage.insert_user(fixtures::user(1, 900, UserRole::Admin));
        storage.insert_request(fixtures::order(42, RequestStatus::Created));
        storage.fail_save_status(true);

        let err = handler(&storage, &gateway)
            .process(
                &Context::background(),
                &fixtures::action(900, "order_status:42:in_progress"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Persist { request_id: 42, .. }));
        assert_eq!(err.acknowledgment(), Acknowledgment::UpdateFailed);
    }
}
