use thiserror::Error;

/// A slug that names no variant of a closed enumeration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {enumeration}: {value}")]
pub struct UnknownVariant {
    /// Name of the enumeration that rejected the slug
    pub enumeration: &'static str,
    /// The rejected input
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(enumeration: &'static str, value: &str) -> Self {
        Self {
            enumeration,
            value: value.to_string(),
        }
    }
}

/// Errors returned by [`Storage`](crate::environment::Storage) implementations.
///
/// `NotFound` is an expected outcome: callers branch on it without logging
/// it as a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The requested row does not exist
    #[error("not found")]
    NotFound,

    /// A uniqueness or integrity constraint rejected the write
    #[error("conflict: {0}")]
    Conflict(String),

    /// The database call itself failed
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    /// Whether this is the distinguished not-found outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Errors returned by [`MessagingGateway`](crate::environment::MessagingGateway)
/// implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The HTTP request could not be performed
    #[error("request failed: {0}")]
    Request(String),

    /// The messaging API answered with an error
    #[error("api error {code}: {description}")]
    Api {
        /// Error code reported by the API
        code: i64,
        /// Human readable description reported by the API
        description: String,
    },

    /// The API response could not be decoded
    #[error("response parsing failed: {0}")]
    Parse(String),

    /// The call was abandoned because its context was cancelled
    #[error("cancelled")]
    Cancelled,

    /// The gateway is not configured
    #[error("messaging gateway disabled")]
    Disabled,
}
