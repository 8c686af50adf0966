//! # Storefront Sync Core
//!
//! Core types and traits for the storefront notification engine.
//!
//! This crate provides the vocabulary shared by the task pool, the event hub,
//! the message synchronizer and the action handler:
//!
//! - **Service requests**: orders and feedback items, the two status-bearing
//!   entities mirrored into the moderators' chat
//! - **Closed enumerations**: statuses, sources, feedback types and roles, each
//!   with a parse function that rejects unknown slugs
//! - **Wire formats**: status callback payloads and deep links
//! - **Context**: explicit cancellation for handlers and gateway calls
//! - **Environment**: the storage, messaging gateway and clock collaborators
//!
//! ## Architecture Principles
//!
//! - Domain writes are synchronous and authoritative
//! - Notifications are detachable, best-effort consumers of domain events
//! - Collaborators are injected as trait objects
//!
//! ## Example
//!
//! ```
//! use storefront_sync_core::callback::StatusCallback;
//! use storefront_sync_core::request::{RequestKind, RequestStatus};
//!
//! let callback: StatusCallback = "order_status:42:reviewed".parse().unwrap();
//! assert_eq!(callback.kind, RequestKind::Order);
//! assert_eq!(callback.request_id, 42);
//! assert_eq!(callback.status, RequestStatus::Reviewed);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

/// Status callback payloads and deep links
pub mod callback;

/// Cancellation-aware request context
pub mod context;

/// Collaborator traits (storage, messaging gateway, clock)
pub mod environment;

/// Error taxonomy shared by collaborators
pub mod error;

/// Telegram `MarkdownV2` escaping
pub mod markup;

/// Service requests, statuses and the entity-to-message mapping
pub mod request;

/// Inline action surfaces attached to chat messages
pub mod surface;

/// Users, principals and author profiles
pub mod user;

pub use context::Context;
pub use error::{GatewayError, StorageError};
