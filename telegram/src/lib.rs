//! # Telegram Gateway
//!
//! Telegram Bot API implementation of the messaging gateway used by the
//! storefront notification engine.
//!
//! ## Example
//!
//! ```no_run
//! use storefront_sync_core::Context;
//! use storefront_sync_core::environment::MessagingGateway;
//! use storefront_sync_core::surface::ActionSurface;
//! use storefront_sync_telegram::{TelegramClient, TelegramGateway};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create client from TELEGRAM_BOT_TOKEN environment variable
//! let gateway = TelegramGateway::new(TelegramClient::from_env()?);
//!
//! let sent = gateway
//!     .send_message(&Context::background(), -100_123, "*Hello*", &ActionSurface::default())
//!     .await?;
//! println!("Posted message {}", sent.message_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `sendMessage` and `editMessageText` in `MarkdownV2` with inline keyboards
//! - `answerCallbackQuery` acknowledgments
//! - Long-polling update loop dispatching button presses to an action sink

pub mod client;
pub mod error;
pub mod gateway;
pub mod poller;
pub mod types;

pub use client::TelegramClient;
pub use error::TelegramError;
pub use gateway::TelegramGateway;
pub use poller::UpdatePoller;
