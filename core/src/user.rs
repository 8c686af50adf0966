//! Users, the principals acting through the chat, and author profiles.

use crate::error::UnknownVariant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of a local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular customer, the default for unseen principals
    User,
    /// Handles orders through the admin panel
    Manager,
    /// Handles orders and feedback, including from the chat
    Moderator,
    /// Everything
    Admin,
}

impl UserRole {
    /// Wire slug.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Manager => "manager",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Roles allowed to change request statuses from the admin panel.
    pub const REQUEST_MANAGERS: [Self; 3] = [Self::Manager, Self::Moderator, Self::Admin];

    /// Roles allowed to act on chat messages.
    pub const MODERATORS: [Self; 2] = [Self::Moderator, Self::Admin];
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "manager" => Ok(Self::Manager),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownVariant::new("user role", s)),
        }
    }
}

/// A local user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal numeric id
    pub id: i64,
    /// Identifier on the messaging platform, if linked
    pub external_id: Option<i64>,
    /// Public identifier
    pub uuid: Uuid,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: Option<String>,
    /// Public handle on the messaging platform
    pub username: Option<String>,
    /// Role
    pub role: UserRole,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the user's role is in `roles`.
    #[must_use]
    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        roles.contains(&self.role)
    }
}

/// A user about to be created. Storage assigns the numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Identifier on the messaging platform
    pub external_id: Option<i64>,
    /// Public identifier
    pub uuid: Uuid,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: Option<String>,
    /// Public handle on the messaging platform
    pub username: Option<String>,
    /// Role
    pub role: UserRole,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    /// An unprivileged user mirroring a chat principal seen for the first time.
    #[must_use]
    pub fn from_principal(principal: &Principal, now: DateTime<Utc>) -> Self {
        Self {
            external_id: Some(principal.external_id),
            uuid: Uuid::now_v7(),
            first_name: principal.first_name.clone(),
            last_name: principal.last_name.clone(),
            username: principal.username.clone(),
            role: UserRole::User,
            created_at: now,
        }
    }

    /// Materialise the stored user once storage has assigned `id`.
    #[must_use]
    pub fn into_user(self, id: i64) -> User {
        User {
            id,
            external_id: self.external_id,
            uuid: self.uuid,
            first_name: self.first_name,
            last_name: self.last_name,
            username: self.username,
            role: self.role,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Human readable author context rendered into chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: Option<String>,
    /// Public handle on the messaging platform
    pub username: Option<String>,
}

impl AuthorProfile {
    /// First and last name joined by a space.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref().filter(|last| !last.is_empty()) {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }

    /// Link to the author's public profile, when a handle exists.
    #[must_use]
    pub fn public_link(&self) -> Option<String> {
        self.username
            .as_deref()
            .filter(|handle| !handle.is_empty())
            .map(|handle| format!("https://t.me/{handle}"))
    }
}

impl From<&User> for AuthorProfile {
    fn from(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        }
    }
}

/// The identity attached to an inbound action by the messaging gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Identifier on the messaging platform
    pub external_id: i64,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: Option<String>,
    /// Public handle
    pub username: Option<String>,
}

/// A principal-attributed request to act on a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAction {
    /// Gateway identifier used to acknowledge this action
    pub id: String,
    /// Who pressed the button
    pub principal: Principal,
    /// Opaque payload carried by the button
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(last: Option<&str>, username: Option<&str>) -> AuthorProfile {
        AuthorProfile {
            first_name: "Anna".to_string(),
            last_name: last.map(str::to_string),
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn display_name_skips_missing_last_name() {
        assert_eq!(profile(None, None).display_name(), "Anna");
        assert_eq!(profile(Some(""), None).display_name(), "Anna");
        assert_eq!(profile(Some("Petrova"), None).display_name(), "Anna Petrova");
    }

    #[test]
    fn public_link_requires_a_handle() {
        assert_eq!(profile(None, None).public_link(), None);
        assert_eq!(profile(None, Some("")).public_link(), None);
        assert_eq!(
            profile(None, Some("anna_p")).public_link().as_deref(),
            Some("https://t.me/anna_p")
        );
    }

    #[test]
    fn principals_become_unprivileged_users() {
        let principal = Principal {
            external_id: 1001,
            first_name: "Ivan".to_string(),
            last_name: None,
            username: Some("ivan".to_string()),
        };

        let user = NewUser::from_principal(&principal, Utc::now()).into_user(3);
        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.external_id, Some(1001));
        assert!(!user.has_any_role(&UserRole::MODERATORS));
    }

    #[test]
    fn roles_parse_from_slugs() {
        assert_eq!("moderator".parse::<UserRole>(), Ok(UserRole::Moderator));
        assert!("root".parse::<UserRole>().is_err());
    }
}
