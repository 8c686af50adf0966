//! Error types for the Telegram Bot API client

use storefront_sync_core::GatewayError;
use thiserror::Error;

/// Errors that can occur when talking to the Bot API
#[derive(Debug, Error)]
pub enum TelegramError {
    /// No bot token configured
    #[error("Missing TELEGRAM_BOT_TOKEN")]
    MissingToken,

    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response parsing failed
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// The Bot API answered `ok: false`
    #[error("API error ({code}): {description}")]
    ApiError {
        /// `error_code` from the envelope, or the HTTP status
        code: i64,
        /// `description` from the envelope
        description: String,
    },
}

impl TelegramError {
    /// Whether an edit was rejected only because nothing changed.
    ///
    /// The Bot API refuses edits whose text and keyboard equal the current
    /// ones. The message already shows the desired state in that case.
    #[must_use]
    pub fn is_not_modified(&self) -> bool {
        matches!(
            self,
            Self::ApiError { code: 400, description } if description.contains("message is not modified")
        )
    }
}

impl From<TelegramError> for GatewayError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::MissingToken => Self::Disabled,
            TelegramError::RequestFailed(msg) => Self::Request(msg),
            TelegramError::ResponseParseFailed(msg) => Self::Parse(msg),
            TelegramError::ApiError { code, description } => Self::Api { code, description },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_modified_is_recognised() {
        let error = TelegramError::ApiError {
            code: 400,
            description: "Bad Request: message is not modified: specified new message content \
                          and reply markup are exactly the same"
                .to_string(),
        };
        assert!(error.is_not_modified());

        let other = TelegramError::ApiError {
            code: 400,
            description: "Bad Request: message to edit not found".to_string(),
        };
        assert!(!other.is_not_modified());
    }

    #[test]
    fn converts_into_gateway_errors() {
        assert_eq!(
            GatewayError::from(TelegramError::ApiError {
                code: 403,
                description: "Forbidden".to_string()
            }),
            GatewayError::Api {
                code: 403,
                description: "Forbidden".to_string()
            }
        );
        assert_eq!(
            GatewayError::from(TelegramError::MissingToken),
            GatewayError::Disabled
        );
    }
}
