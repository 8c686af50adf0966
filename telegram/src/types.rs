//! Bot API request and response types

use serde::{Deserialize, Serialize};
use storefront_sync_core::surface::{ActionButton, ActionSurface, ButtonTarget};
use storefront_sync_core::user::{InboundAction, Principal};

/// Envelope wrapping every Bot API response
#[derive(Clone, Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub ok: bool,
    /// Payload when `ok`
    pub result: Option<T>,
    /// Error text when not `ok`
    pub description: Option<String>,
    /// Error code when not `ok`
    pub error_code: Option<i64>,
}

/// Chat a message belongs to
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Chat {
    /// Chat identifier
    pub id: i64,
}

/// A message, as returned by `sendMessage`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Message {
    /// Message identifier within the chat
    pub message_id: i64,
    /// Chat the message landed in
    pub chat: Chat,
}

/// Account on the messaging platform
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TelegramUser {
    /// Platform identifier
    pub id: i64,
    /// Whether the account is a bot
    #[serde(default)]
    pub is_bot: bool,
    /// First name
    pub first_name: String,
    /// Last name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Public handle
    #[serde(default)]
    pub username: Option<String>,
}

impl From<TelegramUser> for Principal {
    fn from(user: TelegramUser) -> Self {
        Self {
            external_id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
        }
    }
}

/// A button press on an inline keyboard
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CallbackQuery {
    /// Identifier used by `answerCallbackQuery`
    pub id: String,
    /// Who pressed the button
    pub from: TelegramUser,
    /// `callback_data` of the pressed button
    #[serde(default)]
    pub data: Option<String>,
}

impl CallbackQuery {
    /// Convert into an inbound action. Queries without data (game buttons)
    /// carry nothing to act on.
    #[must_use]
    pub fn into_action(self) -> Option<InboundAction> {
        let payload = self.data?;
        Some(InboundAction {
            id: self.id,
            principal: self.from.into(),
            payload,
        })
    }
}

/// One entry returned by `getUpdates`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Update {
    /// Monotonic update identifier
    pub update_id: i64,
    /// Set for button presses
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Inline keyboard attached below a message
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardMarkup {
    /// Button rows
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// A single inline keyboard button
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardButton {
    /// Label
    pub text: String,
    /// Data sent back in a callback query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    /// URL opened on press
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&ActionButton> for InlineKeyboardButton {
    fn from(button: &ActionButton) -> Self {
        let (callback_data, url) = match &button.target {
            ButtonTarget::Callback(data) => (Some(data.clone()), None),
            ButtonTarget::Url(url) => (None, Some(url.clone())),
        };
        Self {
            text: button.text.clone(),
            callback_data,
            url,
        }
    }
}

impl From<&ActionSurface> for InlineKeyboardMarkup {
    fn from(surface: &ActionSurface) -> Self {
        Self {
            inline_keyboard: surface
                .rows
                .iter()
                .map(|row| row.iter().map(InlineKeyboardButton::from).collect())
                .collect(),
        }
    }
}

/// Body of `sendMessage`
#[derive(Clone, Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    /// Target chat
    pub chat_id: i64,
    /// Text in `parse_mode` markup
    pub text: &'a str,
    /// Always `MarkdownV2`
    pub parse_mode: &'static str,
    /// Buttons
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// Body of `editMessageText`
#[derive(Clone, Debug, Serialize)]
pub struct EditMessageTextRequest<'a> {
    /// Chat of the edited message
    pub chat_id: i64,
    /// Edited message
    pub message_id: i64,
    /// Replacement text in `parse_mode` markup
    pub text: &'a str,
    /// Always `MarkdownV2`
    pub parse_mode: &'static str,
    /// Replacement buttons
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// Body of `answerCallbackQuery`
#[derive(Clone, Debug, Serialize)]
pub struct AnswerCallbackQueryRequest<'a> {
    /// Query being answered
    pub callback_query_id: &'a str,
    /// Notification shown to the user
    pub text: &'a str,
}

/// Body of `getUpdates`
#[derive(Clone, Debug, Serialize)]
pub struct GetUpdatesRequest {
    /// First update to return
    pub offset: i64,
    /// Long polling timeout in seconds
    pub timeout: u64,
    /// Update kinds to receive
    pub allowed_updates: Vec<&'static str>,
}
