//! Collaborators injected into the synchronizer and the action handler.
//!
//! Everything with side effects sits behind a trait here so the notifier can
//! be wired against PostgreSQL and Telegram in production and against the
//! in-memory doubles from `storefront-sync-testing` in tests.

use crate::context::Context;
use crate::error::{GatewayError, StorageError};
use crate::request::{MessageMapping, NewServiceRequest, RequestKind, ServiceRequest};
use crate::surface::ActionSurface;
use crate::user::{AuthorProfile, InboundAction, NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence for service requests, users and message mappings.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load a request by its internal id.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if no such request exists.
    async fn load_request(&self, kind: RequestKind, id: i64)
    -> Result<ServiceRequest, StorageError>;

    /// Load a request by its public identifier.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if no such request exists.
    async fn load_request_by_uuid(
        &self,
        kind: RequestKind,
        uuid: Uuid,
    ) -> Result<ServiceRequest, StorageError>;

    /// Persist a new request and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn create_request(
        &self,
        kind: RequestKind,
        draft: &NewServiceRequest,
    ) -> Result<ServiceRequest, StorageError>;

    /// Persist `request.status` and `request.updated_at`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if the request vanished, otherwise a
    /// database error.
    async fn save_status(&self, request: &ServiceRequest) -> Result<(), StorageError>;

    /// Record where a request's chat message lives.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn create_mapping(&self, mapping: &MessageMapping) -> Result<(), StorageError>;

    /// The authoritative mapping for a request: the one with the highest
    /// message id.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if the request was never mirrored.
    async fn get_mapping(
        &self,
        kind: RequestKind,
        request_id: i64,
    ) -> Result<MessageMapping, StorageError>;

    /// Author context of a request owned by `user_id`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if the user does not exist.
    async fn resolve_author(&self, user_id: i64) -> Result<AuthorProfile, StorageError>;

    /// Look a user up by their messaging platform identifier.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if the principal was never seen.
    async fn find_user_by_external_id(&self, external_id: i64) -> Result<User, StorageError>;

    /// Persist a new user.
    ///
    /// # Errors
    ///
    /// [`StorageError::Conflict`] if the external id is already taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, StorageError>;
}

/// Identifies a message accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    /// Chat the message landed in
    pub chat_id: i64,
    /// Message identifier within that chat
    pub message_id: i64,
}

/// Outbound side of the moderators' chat.
///
/// Implementations abort an in-flight call with [`GatewayError::Cancelled`]
/// when `ctx` is cancelled.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Post a new message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message was not accepted.
    async fn send_message(
        &self,
        ctx: &Context,
        chat_id: i64,
        text: &str,
        surface: &ActionSurface,
    ) -> Result<SentMessage, GatewayError>;

    /// Replace the text and buttons of an existing message.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit was not accepted.
    async fn edit_message(
        &self,
        ctx: &Context,
        chat_id: i64,
        message_id: i64,
        text: &str,
        surface: &ActionSurface,
    ) -> Result<(), GatewayError>;

    /// Show a short acknowledgment to whoever triggered `action_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgment was not delivered.
    async fn answer_action(
        &self,
        ctx: &Context,
        action_id: &str,
        text: &str,
    ) -> Result<(), GatewayError>;
}

/// Entry point the gateway's inbound dispatch calls for each button press.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Handle one inbound action, acknowledging it exactly once.
    async fn on_action(&self, ctx: Context, action: InboundAction);
}

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
