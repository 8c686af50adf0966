//! Service requests: the shared shape of orders and feedback items.
//!
//! Both entity kinds carry a [`RequestStatus`] that is mirrored into an
//! external chat message. Status is a complete graph: every status can move to
//! either of the other two, and none of them is terminal.

use crate::error::UnknownVariant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The two entity kinds mirrored into the moderators' chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// A customer order
    Order,
    /// A feedback item (contact request, partnership offer, ...)
    Feedback,
}

impl RequestKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 2] = [Self::Order, Self::Feedback];

    /// Entity type slug used in deep links.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Feedback => "feedback",
        }
    }

    /// Prefix of status callback payloads for this kind.
    #[must_use]
    pub const fn callback_prefix(self) -> &'static str {
        match self {
            Self::Order => "order_status",
            Self::Feedback => "feedback_status",
        }
    }

    /// Heading used in the chat message.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Order => "Order",
            Self::Feedback => "Feedback",
        }
    }

    /// Label of the "open full record" button.
    #[must_use]
    pub const fn view_label(self) -> &'static str {
        match self {
            Self::Order => "View order",
            Self::Feedback => "View request",
        }
    }

    /// Parse a callback prefix back into a kind.
    #[must_use]
    pub fn from_callback_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.callback_prefix() == prefix)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for RequestKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(Self::Order),
            "feedback" => Ok(Self::Feedback),
            _ => Err(UnknownVariant::new("request kind", s)),
        }
    }
}

/// Processing status of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Freshly submitted, nobody has picked it up yet
    Created,
    /// A moderator is working on it
    InProgress,
    /// Handled
    Reviewed,
}

impl RequestStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 3] = [Self::Created, Self::InProgress, Self::Reviewed];

    /// Wire slug (`created`, `in_progress`, `reviewed`).
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::Reviewed => "reviewed",
        }
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "New",
            Self::InProgress => "In progress",
            Self::Reviewed => "Done",
        }
    }

    /// Glyph shown in front of the message heading.
    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Created => "🆕",
            Self::InProgress => "💼",
            Self::Reviewed => "✅",
        }
    }

    /// Label of the button that moves a request *into* this status.
    #[must_use]
    pub const fn transition_label(self) -> &'static str {
        match self {
            Self::Created => "Reopen",
            Self::InProgress => "Take in work",
            Self::Reviewed => "Complete",
        }
    }

    /// The statuses reachable from this one: the two others, never itself.
    pub fn others(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |status| *status != self)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.slug() == s)
            .ok_or_else(|| UnknownVariant::new("request status", s))
    }
}

/// Channel an order was submitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    /// Public landing page
    Landing,
    /// Single page application
    Spa,
    /// Telegram mini app
    Tma,
}

impl OrderSource {
    /// Wire slug.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Landing => "landing",
            Self::Spa => "spa",
            Self::Tma => "tma",
        }
    }
}

impl FromStr for OrderSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "landing" => Ok(Self::Landing),
            "spa" => Ok(Self::Spa),
            "tma" => Ok(Self::Tma),
            _ => Err(UnknownVariant::new("order source", s)),
        }
    }
}

/// What a feedback item is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// Asks for a call back from a manager
    ManagerContact,
    /// Business partnership offer
    PartnershipOffer,
    /// General feedback
    FeedbackRequest,
}

impl FeedbackType {
    /// Wire slug.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::ManagerContact => "manager_contact",
            Self::PartnershipOffer => "partnership_offer",
            Self::FeedbackRequest => "feedback_request",
        }
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ManagerContact => "Contact a manager",
            Self::PartnershipOffer => "Partnership offer",
            Self::FeedbackRequest => "Feedback",
        }
    }
}

impl FromStr for FeedbackType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager_contact" => Ok(Self::ManagerContact),
            "partnership_offer" => Ok(Self::PartnershipOffer),
            "feedback_request" => Ok(Self::FeedbackRequest),
            _ => Err(UnknownVariant::new("feedback type", s)),
        }
    }
}

/// An order or a feedback item, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Which entity kind this is
    pub kind: RequestKind,
    /// Internal numeric id
    pub id: i64,
    /// Public identifier
    pub uuid: Uuid,
    /// Current processing status
    pub status: RequestStatus,
    /// Submission channel, if known
    pub source: Option<OrderSource>,
    /// Topic of the request (feedback only)
    pub feedback_type: Option<FeedbackType>,
    /// Contact name
    pub name: String,
    /// Contact phone
    pub phone: String,
    /// Free text
    pub content: String,
    /// Owning user, absent for guest submissions
    pub user_id: Option<i64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Move the request to `status`, stamping the modification time.
    pub fn transition(&mut self, status: RequestStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// A request about to be persisted. Storage assigns the numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewServiceRequest {
    /// Public identifier
    pub uuid: Uuid,
    /// Submission channel, if known
    pub source: Option<OrderSource>,
    /// Topic of the request (feedback only)
    pub feedback_type: Option<FeedbackType>,
    /// Contact name
    pub name: String,
    /// Contact phone
    pub phone: String,
    /// Free text
    pub content: String,
    /// Owning user, absent for guest submissions
    pub user_id: Option<i64>,
    /// Creation time, also used as the initial modification time
    pub created_at: DateTime<Utc>,
}

impl NewServiceRequest {
    /// Materialise the stored request once storage has assigned `id`.
    ///
    /// New requests always start in [`RequestStatus::Created`].
    #[must_use]
    pub fn into_request(self, kind: RequestKind, id: i64) -> ServiceRequest {
        ServiceRequest {
            kind,
            id,
            uuid: self.uuid,
            status: RequestStatus::Created,
            source: self.source,
            feedback_type: self.feedback_type,
            name: self.name,
            phone: self.phone,
            content: self.content,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Where the chat message mirroring a request lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageMapping {
    /// Entity kind of the mirrored request
    pub kind: RequestKind,
    /// Internal id of the mirrored request
    pub request_id: i64,
    /// Chat the message was posted to
    pub chat_id: i64,
    /// Message identifier within the chat
    pub message_id: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn status_slugs_round_trip_through_parse() {
        for status in RequestStatus::ALL {
            assert_eq!(status.slug().parse::<RequestStatus>(), Ok(status));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "bogus".parse::<RequestStatus>().unwrap_err();
        assert_eq!(err.value, "bogus");
        assert_eq!(err.to_string(), "unknown request status: bogus");
    }

    #[test]
    fn others_never_contains_self() {
        for status in RequestStatus::ALL {
            let others: Vec<_> = status.others().collect();
            assert_eq!(others.len(), 2);
            assert!(!others.contains(&status));
        }
    }

    #[test]
    fn others_keep_declaration_order() {
        let others: Vec<_> = RequestStatus::InProgress.others().collect();
        assert_eq!(others, vec![RequestStatus::Created, RequestStatus::Reviewed]);
    }

    #[test]
    fn status_serializes_as_slug() {
        let json = serde_json::to_string(&RequestStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn callback_prefix_maps_back_to_kind() {
        assert_eq!(
            RequestKind::from_callback_prefix("feedback_status"),
            Some(RequestKind::Feedback)
        );
        assert_eq!(RequestKind::from_callback_prefix("order"), None);
    }

    #[test]
    fn new_requests_start_created() {
        let now = Utc::now();
        let draft = NewServiceRequest {
            uuid: Uuid::new_v4(),
            source: Some(OrderSource::Landing),
            feedback_type: None,
            name: "Ann".to_string(),
            phone: "+7 900 000 00 00".to_string(),
            content: "Balloons".to_string(),
            user_id: None,
            created_at: now,
        };

        let request = draft.into_request(RequestKind::Order, 7);
        assert_eq!(request.id, 7);
        assert_eq!(request.status, RequestStatus::Created);
        assert_eq!(request.updated_at, now);
    }

    #[test]
    fn other_enumerations_reject_unknown_slugs() {
        assert!("kiosk".parse::<OrderSource>().is_err());
        assert!("complaint".parse::<FeedbackType>().is_err());
        assert!("shipment".parse::<RequestKind>().is_err());
        assert_eq!("tma".parse::<OrderSource>(), Ok(OrderSource::Tma));
        assert_eq!(
            "partnership_offer".parse::<FeedbackType>(),
            Ok(FeedbackType::PartnershipOffer)
        );
    }
}
