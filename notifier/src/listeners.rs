//! The synchronizer: keeps one chat message per request in step with the
//! request's status.
//!
//! Four handlers are subscribed, one per (kind × {Created, Changed}):
//!
//! - **Created** renders the request, posts it to the moderators' group and
//!   records where the message landed.
//! - **Changed** looks that record up and edits the message in place. A
//!   request that was never posted has nothing to edit, so the handler is a
//!   no-op.
//!
//! Every step is best-effort. Failures are returned to the task pool, which
//! logs them; nothing is retried and the domain write that triggered the
//! event is never affected.

use crate::render::Renderer;
use metrics::counter;
use std::sync::Arc;
use storefront_sync_core::environment::{MessagingGateway, SentMessage, Storage};
use storefront_sync_core::request::{MessageMapping, RequestKind, ServiceRequest};
use storefront_sync_core::user::AuthorProfile;
use storefront_sync_core::{Context, GatewayError, StorageError};
use storefront_sync_runtime::{EventBus, Subscription};
use thiserror::Error;

/// Which step of a synchronization failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Author context could not be resolved
    #[error("failed to resolve author {user_id}: {source}")]
    Author {
        /// Owning user
        user_id: i64,
        /// Storage failure
        source: StorageError,
    },

    /// The gateway rejected the new message
    #[error("failed to send {kind} message: {source}")]
    Send {
        /// Request kind
        kind: RequestKind,
        /// Gateway failure
        source: GatewayError,
    },

    /// The message was sent but its mapping could not be stored
    #[error("failed to save {kind} message mapping: {source}")]
    SaveMapping {
        /// Request kind
        kind: RequestKind,
        /// Storage failure
        source: StorageError,
    },

    /// The mapping lookup failed for a reason other than not-found
    #[error("failed to load {kind} message mapping: {source}")]
    LoadMapping {
        /// Request kind
        kind: RequestKind,
        /// Storage failure
        source: StorageError,
    },

    /// The gateway rejected the edit
    #[error("failed to edit {kind} message: {source}")]
    Edit {
        /// Request kind
        kind: RequestKind,
        /// Gateway failure
        source: GatewayError,
    },
}

/// What a handler invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A new message was posted and mapped
    Sent(SentMessage),
    /// The mapped message was edited
    Edited(MessageMapping),
    /// Nothing was ever posted for this request
    Unmapped,
}

/// Mirrors requests into the moderators' chat.
pub struct Synchronizer {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn MessagingGateway>,
    renderer: Renderer,
    chat_id: i64,
}

impl Synchronizer {
    /// Create a synchronizer posting into `chat_id`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn MessagingGateway>,
        renderer: Renderer,
        chat_id: i64,
    ) -> Self {
        Self {
            storage,
            gateway,
            renderer,
            chat_id,
        }
    }

    /// Subscribe the four handlers.
    ///
    /// The subscriptions are returned so the caller decides how long the
    /// handlers stay registered.
    pub fn register(self: &Arc<Self>, bus: &EventBus) -> Vec<Subscription> {
        let mut subscriptions = Vec::with_capacity(RequestKind::ALL.len() * 2);

        for kind in RequestKind::ALL {
            let sync = Arc::clone(self);
            subscriptions.push(bus.created(kind).subscribe(move |ctx, request| {
                let sync = Arc::clone(&sync);
                async move {
                    sync.on_created(&ctx, &request)
                        .await
                        .map(drop)
                        .map_err(anyhow::Error::from)
                }
            }));

            let sync = Arc::clone(self);
            subscriptions.push(bus.changed(kind).subscribe(move |ctx, request| {
                let sync = Arc::clone(&sync);
                async move {
                    sync.on_changed(&ctx, &request)
                        .await
                        .map(drop)
                        .map_err(anyhow::Error::from)
                }
            }));
        }

        tracing::info!(
            handlers = subscriptions.len(),
            chat_id = self.chat_id,
            "Synchronizer registered"
        );
        subscriptions
    }

    async fn author(&self, request: &ServiceRequest) -> Result<Option<AuthorProfile>, SyncError> {
        let Some(user_id) = request.user_id else {
            return Ok(None);
        };
        self.storage
            .resolve_author(user_id)
            .await
            .map(Some)
            .map_err(|source| SyncError::Author { user_id, source })
    }

    /// Post a message for a freshly created request and map it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] naming the failed step. A message that was
    /// sent stays in the chat even if its mapping could not be stored.
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(kind = %request.kind, request_id = request.id, correlation_id = ctx.request_id())
    )]
    pub async fn on_created(
        &self,
        ctx: &Context,
        request: &ServiceRequest,
    ) -> Result<SyncOutcome, SyncError> {
        let author = self.author(request).await?;
        let text = self.renderer.text(request, author.as_ref());
        let surface = self.renderer.surface(request);

        let sent = self
            .gateway
            .send_message(ctx, self.chat_id, &text, &surface)
            .await
            .map_err(|source| SyncError::Send {
                kind: request.kind,
                source,
            })?;
        counter!("sync_messages_sent_total", "kind" => request.kind.slug()).increment(1);

        self.storage
            .create_mapping(&MessageMapping {
                kind: request.kind,
                request_id: request.id,
                chat_id: sent.chat_id,
                message_id: sent.message_id,
            })
            .await
            .map_err(|source| SyncError::SaveMapping {
                kind: request.kind,
                source,
            })?;

        tracing::info!(
            chat_id = sent.chat_id,
            message_id = sent.message_id,
            "Request posted to chat"
        );
        Ok(SyncOutcome::Sent(sent))
    }

    /// Re-render the mapped message of a request whose status changed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] naming the failed step. A missing mapping is
    /// not an error.
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(kind = %request.kind, request_id = request.id, status = %request.status, correlation_id = ctx.request_id())
    )]
    pub async fn on_changed(
        &self,
        ctx: &Context,
        request: &ServiceRequest,
    ) -> Result<SyncOutcome, SyncError> {
        let author = self.author(request).await?;

        let mapping = match self.storage.get_mapping(request.kind, request.id).await {
            Ok(mapping) => mapping,
            Err(StorageError::NotFound) => {
                tracing::debug!("No chat message to update");
                return Ok(SyncOutcome::Unmapped);
            }
            Err(source) => {
                return Err(SyncError::LoadMapping {
                    kind: request.kind,
                    source,
                });
            }
        };

        let text = self.renderer.text(request, author.as_ref());
        let surface = self.renderer.surface(request);
        self.gateway
            .edit_message(ctx, mapping.chat_id, mapping.message_id, &text, &surface)
            .await
            .map_err(|source| SyncError::Edit {
                kind: request.kind,
                source,
            })?;
        counter!("sync_messages_edited_total", "kind" => request.kind.slug()).increment(1);

        tracing::info!(
            chat_id = mapping.chat_id,
            message_id = mapping.message_id,
            "Chat message updated"
        );
        Ok(SyncOutcome::Edited(mapping))
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("renderer", &self.renderer)
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use storefront_sync_core::request::RequestStatus;
    use storefront_sync_core::user::UserRole;
    use storefront_sync_testing::{InMemoryStorage, RecordingGateway, fixtures};

    const CHAT: i64 = -100_777;

    fn synchronizer(storage: &InMemoryStorage, gateway: &RecordingGateway) -> Synchronizer {
        Synchronizer::new(
            Arc::new(storage.clone()),
            Arc::new(gateway.clone()),
            Renderer::new("https://t.me/bot?startapp="),
            CHAT,
        )
    }

    #[tokio::test]
    async fn created_posts_and_maps() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        let order = fixtures::order(7, RequestStatus::Created);

        let outcome = synchronizer(&storage, &gateway)
            .on_created(&Context::background(), &order)
            .await
            .unwrap();

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, CHAT);
        assert!(sent[0].text.contains("Order \\#7"));
        assert_eq!(
            outcome,
            SyncOutcome::Sent(SentMessage {
                chat_id: CHAT,
                message_id: sent[0].message_id
            })
        );
        let mappings = storage.mappings_for(RequestKind::Order, 7);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].message_id, sent[0].message_id);
    }

    #[tokio::test]
    async fn author_failure_aborts_before_sending() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        storage.fail_resolve_author(true);
        let mut order = fixtures::order(7, RequestStatus::Created);
        order.user_id = Some(1);

        let result = synchronizer(&storage, &gateway)
            .on_created(&Context::background(), &order)
            .await;

        assert!(matches!(result, Err(SyncError::Author { user_id: 1, .. })));
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn owned_requests_show_their_author() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        storage.insert_user(fixtures::user(1, 500, UserRole::User));
        let mut feedback = fixtures::feedback(3, RequestStatus::Created);
        feedback.user_id = Some(1);

        synchronizer(&storage, &gateway)
            .on_created(&Context::background(), &feedback)
            .await
            .unwrap();

        assert!(gateway.sent()[0]
            .text
            .contains("[Maria Ivanova](https://t.me/maria_iv)"));
    }

    #[tokio::test]
    async fn send_failure_stores_no_mapping() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        gateway.fail_sends(true);

        let result = synchronizer(&storage, &gateway)
            .on_created(&Context::background(), &fixtures::order(7, RequestStatus::Created))
            .await;

        assert!(matches!(result, Err(SyncError::Send { kind: RequestKind::Order, .. })));
        assert!(storage.mappings_for(RequestKind::Order, 7).is_empty());
    }

    #[tokio::test]
    async fn mapping_failure_is_reported_after_sending() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        storage.fail_create_mapping(true);

        let result = synchronizer(&storage, &gateway)
            .on_created(&Context::background(), &fixtures::order(7, RequestStatus::Created))
            .await;

        assert!(matches!(result, Err(SyncError::SaveMapping { .. })));
        assert_eq!(gateway.sent().len(), 1);
    }

    #[tokio::test]
    async fn changed_without_mapping_is_a_no_op() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();

        let outcome = synchronizer(&storage, &gateway)
            .on_changed(&Context::background(), &fixtures::feedback(3, RequestStatus::Reviewed))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Unmapped);
        assert_eq!(gateway.message_calls(), 0);
    }

    #[tokio::test]
    async fn changed_edits_the_latest_mapping() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        for message_id in [10, 12] {
            storage
                .create_mapping(&MessageMapping {
                    kind: RequestKind::Order,
                    request_id: 7,
                    chat_id: CHAT,
                    message_id,
                })
                .await
                .unwrap();
        }

        let order = fixtures::order(7, RequestStatus::InProgress);
        synchronizer(&storage, &gateway)
            .on_changed(&Context::background(), &order)
            .await
            .unwrap();

        let edits = gateway.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].message_id, 12);
        assert!(edits[0].text.contains("In progress"));
        let payloads: Vec<_> = edits[0].surface.callback_payloads().collect();
        assert_eq!(payloads, ["order_status:7:created", "order_status:7:reviewed"]);
    }

    #[tokio::test]
    async fn edit_failure_is_reported() {
        let storage = InMemoryStorage::new();
        let gateway = RecordingGateway::new();
        gateway.fail_edits(true);
        storage
            .create_mapping(&MessageMapping {
                kind: RequestKind::Order,
                request_id: 7,
                chat_id: CHAT,
                message_id: 10,
            })
            .await
            .unwrap();

        let result = synchronizer(&storage, &gateway)
            .on_changed(&Context::background(), &fixtures::order(7, RequestStatus::Reviewed))
            .await;

        assert!(matches!(result, Err(SyncError::Edit { .. })));
    }
}
