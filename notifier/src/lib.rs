//! Storefront Sync - mirrors storefront orders and feedback into the
//! moderators' Telegram group and applies status changes made there.
//!
//! # Architecture
//!
//! ```text
//!  RequestService ──publish──▶ EventBus ──▶ TaskPool ──▶ Synchronizer ──▶ Telegram
//!        ▲                      (4 kinds)                      │
//!        │                         ▲                           ▼
//!    Storage ◀── save_status ── ActionHandler ◀── UpdatePoller  mappings
//! ```
//!
//! - **Write path**: [`requests::RequestService`] persists first, then
//!   publishes Created or Changed with a detached context
//! - **Mirror path**: [`listeners::Synchronizer`] posts one message per
//!   request and edits it on every status change
//! - **Inbound path**: [`actions::ActionHandler`] turns button presses into
//!   status changes, which republish Changed and so edit the message again
//!
//! Notification is best-effort throughout: no step of the mirror or inbound
//! path can fail a domain write.

/// Inbound chat actions
pub mod actions;

/// Application wiring and lifecycle
pub mod app;

/// Configuration from environment variables
pub mod config;

/// Synchronizer subscribed to the domain events
pub mod listeners;

/// Message text and buttons
pub mod render;

/// Request creation and privileged status changes
pub mod requests;

pub use app::{AppError, Application, shutdown_signal};
pub use config::Config;
