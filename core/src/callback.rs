//! Wire formats carried by chat buttons.
//!
//! Status buttons carry `"<prefix>:<decimal id>:<status slug>"`, for example
//! `order_status:42:in_progress`. The "open full record" button carries a deep
//! link whose parameter is URL-safe base64 of `"<entity type>:<uuid>"`.

use crate::request::{RequestKind, RequestStatus};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Why a callback payload was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackParseError {
    /// Not exactly three `:`-separated segments
    #[error("expected 3 segments, got {0}")]
    SegmentCount(usize),

    /// The first segment is not a known prefix
    #[error("unknown prefix: {0}")]
    UnknownPrefix(String),

    /// The id segment is not a decimal integer
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// The status segment is not a known slug
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

/// A decoded status-transition button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCallback {
    /// Entity kind, from the prefix
    pub kind: RequestKind,
    /// Internal id of the request
    pub request_id: i64,
    /// Requested target status
    pub status: RequestStatus,
}

impl StatusCallback {
    /// Build the payload for a button moving `request_id` to `status`.
    #[must_use]
    pub const fn new(kind: RequestKind, request_id: i64, status: RequestStatus) -> Self {
        Self {
            kind,
            request_id,
            status,
        }
    }
}

impl fmt::Display for StatusCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.kind.callback_prefix(),
            self.request_id,
            self.status.slug()
        )
    }
}

impl FromStr for StatusCallback {
    type Err = CallbackParseError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = payload.split(':').collect();
        let [prefix, id, status] = parts.as_slice() else {
            return Err(CallbackParseError::SegmentCount(parts.len()));
        };

        let kind = RequestKind::from_callback_prefix(prefix)
            .ok_or_else(|| CallbackParseError::UnknownPrefix((*prefix).to_string()))?;
        let request_id = id
            .parse::<i64>()
            .map_err(|_| CallbackParseError::InvalidId((*id).to_string()))?;
        let status = status
            .parse::<RequestStatus>()
            .map_err(|_| CallbackParseError::UnknownStatus((*status).to_string()))?;

        Ok(Self {
            kind,
            request_id,
            status,
        })
    }
}

/// Why a deep link parameter was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkError {
    /// Not valid URL-safe base64
    #[error("invalid base64: {0}")]
    Encoding(String),

    /// Decoded bytes are not `"<entity type>:<uuid>"`
    #[error("malformed deep link: {0}")]
    Malformed(String),
}

/// Reference to the full record of a request, opened from the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepLink {
    /// Entity kind
    pub kind: RequestKind,
    /// Public identifier of the request
    pub uuid: Uuid,
}

impl DeepLink {
    /// Create a deep link to the given request.
    #[must_use]
    pub const fn new(kind: RequestKind, uuid: Uuid) -> Self {
        Self { kind, uuid }
    }

    /// URL-safe base64 (with padding) of `"<entity type>:<uuid>"`.
    #[must_use]
    pub fn encode(&self) -> String {
        URL_SAFE.encode(format!("{}:{}", self.kind.slug(), self.uuid))
    }

    /// Append the encoded parameter to `base`, e.g. `https://t.me/bot?startapp=`.
    #[must_use]
    pub fn url(&self, base: &str) -> String {
        format!("{base}{}", self.encode())
    }

    /// Decode a parameter produced by [`DeepLink::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`DeepLinkError`] if the parameter is not base64 or does not
    /// name a known entity type and a UUID.
    pub fn decode(param: &str) -> Result<Self, DeepLinkError> {
        let bytes = URL_SAFE
            .decode(param)
            .map_err(|e| DeepLinkError::Encoding(e.to_string()))?;
        let text =
            String::from_utf8(bytes).map_err(|e| DeepLinkError::Malformed(e.to_string()))?;
        let (kind, uuid) = text
            .split_once(':')
            .ok_or_else(|| DeepLinkError::Malformed(text.clone()))?;

        Ok(Self {
            kind: kind
                .parse::<RequestKind>()
                .map_err(|e| DeepLinkError::Malformed(e.to_string()))?,
            uuid: Uuid::parse_str(uuid).map_err(|e| DeepLinkError::Malformed(e.to_string()))?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_well_formed_payload() {
        let callback: StatusCallback = "feedback_status:3:in_progress".parse().unwrap();
        assert_eq!(
            callback,
            StatusCallback::new(RequestKind::Feedback, 3, RequestStatus::InProgress)
        );
    }

    #[test]
    fn formats_wire_payload() {
        let callback = StatusCallback::new(RequestKind::Order, 42, RequestStatus::Reviewed);
        assert_eq!(callback.to_string(), "order_status:42:reviewed");
    }

    #[test]
    fn rejects_unknown_status() {
        assert_eq!(
            "order_status:42:bogus".parse::<StatusCallback>(),
            Err(CallbackParseError::UnknownStatus("bogus".to_string()))
        );
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert_eq!(
            "order_status:42".parse::<StatusCallback>(),
            Err(CallbackParseError::SegmentCount(2))
        );
        assert_eq!(
            "order_status:42:reviewed:extra".parse::<StatusCallback>(),
            Err(CallbackParseError::SegmentCount(4))
        );
    }

    #[test]
    fn rejects_unknown_prefix_and_non_numeric_id() {
        assert_eq!(
            "review_status:1:created".parse::<StatusCallback>(),
            Err(CallbackParseError::UnknownPrefix("review_status".to_string()))
        );
        assert_eq!(
            "order_status:4x:created".parse::<StatusCallback>(),
            Err(CallbackParseError::InvalidId("4x".to_string()))
        );
    }

    #[test]
    fn deep_link_encodes_entity_type_and_uuid() {
        let uuid = Uuid::parse_str("0190b6a1-7c3e-7d2a-9f00-1234567890ab").unwrap();
        let link = DeepLink::new(RequestKind::Order, uuid);

        let decoded = URL_SAFE.decode(link.encode()).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "order:0190b6a1-7c3e-7d2a-9f00-1234567890ab"
        );
        assert_eq!(DeepLink::decode(&link.encode()), Ok(link));
        assert!(link.url("https://t.me/bot?startapp=").starts_with("https://t.me/bot?startapp="));
    }

    #[test]
    fn deep_link_rejects_garbage() {
        assert!(matches!(DeepLink::decode("%%%"), Err(DeepLinkError::Encoding(_))));
        let bogus = URL_SAFE.encode("invoice:123");
        assert!(matches!(DeepLink::decode(&bogus), Err(DeepLinkError::Malformed(_))));
    }

    proptest! {
        #[test]
        fn arbitrary_input_never_panics(payload in ".*") {
            let _ = payload.parse::<StatusCallback>();
        }

        #[test]
        fn generated_payloads_parse_back(id in 0i64..i64::MAX, status in 0usize..3, feedback in any::<bool>()) {
            let kind = if feedback { RequestKind::Feedback } else { RequestKind::Order };
            let callback = StatusCallback::new(kind, id, RequestStatus::ALL[status]);
            prop_assert_eq!(callback.to_string().parse::<StatusCallback>(), Ok(callback));
        }
    }
}
