//! Telegram Bot API client implementation

use crate::error::TelegramError;
use crate::types::{
    AnswerCallbackQueryRequest, ApiResponse, EditMessageTextRequest, GetUpdatesRequest,
    InlineKeyboardMarkup, Message, SendMessageRequest, Update,
};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const PARSE_MODE: &str = "MarkdownV2";

/// Extra time granted to a long poll on top of its server-side timeout.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    token: String,
    api_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a new client with token from environment
    ///
    /// # Errors
    ///
    /// Returns `TelegramError::MissingToken` if `TELEGRAM_BOT_TOKEN` is not set
    pub fn from_env() -> Result<Self, TelegramError> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or(TelegramError::MissingToken)?;

        Ok(Self::new(token))
    }

    /// Create a new client with an explicit bot token
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Builder: point the client at another API host (local Bot API server, tests)
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token)
    }

    async fn call<B, R>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<R, TelegramError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // The request URL carries the token.
        let response = request
            .send()
            .await
            .map_err(|e| TelegramError::RequestFailed(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TelegramError::RequestFailed(e.without_url().to_string()))?;

        match serde_json::from_str::<ApiResponse<R>>(&body) {
            Ok(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(ApiResponse { ok: true, .. }) => Err(TelegramError::ResponseParseFailed(format!(
                "{method}: missing result"
            ))),
            Ok(envelope) => Err(TelegramError::ApiError {
                code: envelope
                    .error_code
                    .unwrap_or_else(|| i64::from(status.as_u16())),
                description: envelope.description.unwrap_or_default(),
            }),
            Err(e) if status == StatusCode::OK => {
                Err(TelegramError::ResponseParseFailed(e.to_string()))
            }
            Err(_) => Err(TelegramError::ApiError {
                code: i64::from(status.as_u16()),
                description: body,
            }),
        }
    }

    /// Post a `MarkdownV2` message
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing failures
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: PARSE_MODE,
            reply_markup: markup,
        };
        self.call("sendMessage", &request, None).await
    }

    /// Replace the text and keyboard of a message
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing failures
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let request = EditMessageTextRequest {
            chat_id,
            message_id,
            text,
            parse_mode: PARSE_MODE,
            reply_markup: markup,
        };
        // Returns the edited message, or `true` for inline messages.
        self.call::<_, serde_json::Value>("editMessageText", &request, None)
            .await
            .map(drop)
    }

    /// Show a notification to whoever pressed a button
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing failures
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), TelegramError> {
        let request = AnswerCallbackQueryRequest {
            callback_query_id,
            text,
        };
        self.call::<_, bool>("answerCallbackQuery", &request, None)
            .await
            .map(drop)
    }

    /// Long-poll for button presses starting at `offset`
    ///
    /// Waits up to `timeout` on the server side before returning an empty
    /// batch.
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing failures
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: vec!["callback_query"],
        };
        self.call("getUpdates", &request, Some(timeout + POLL_GRACE))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TelegramClient::new("123:abc".to_string());
        assert_eq!(client.token, "123:abc");
        assert_eq!(client.api_url, "https://api.telegram.org");
        assert_eq!(
            client.method_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );
    }

    #[test]
    fn api_url_trailing_slash_is_dropped() {
        let client = TelegramClient::new("t".to_string()).with_api_url("http://localhost:8081/");
        assert_eq!(client.method_url("sendMessage"), "http://localhost:8081/bott/sendMessage");
    }

    #[test]
    fn debug_hides_the_token() {
        let client = TelegramClient::new("secret-token".to_string());
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
