//! User model and the request shapes that touch it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Admin permission level attached to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AdminTier {
    #[default]
    None = 0,
    Admin = 1,
    SuperAdmin = 2,
}

impl AdminTier {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(AdminTier::None),
            1 => Some(AdminTier::Admin),
            2 => Some(AdminTier::SuperAdmin),
            _ => None,
        }
    }
}

impl From<AdminTier> for u8 {
    fn from(tier: AdminTier) -> Self {
        tier as u8
    }
}

impl TryFrom<u8> for AdminTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        AdminTier::from_i64(i64::from(value))
            .ok_or_else(|| format!("admin tier must be 0, 1 or 2, got {}", value))
    }
}

/// Ban state of a user. `{false, 0}` is the unbanned baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanState {
    pub status: bool,
    /// Epoch milliseconds
    pub expires_at: i64,
}

impl BanState {
    /// Whether the ban is in force at `now_ms`. Expiry is never swept from storage, so an
    /// elapsed ban still reads `status == true` until someone unbans.
    pub fn is_active_at(&self, now_ms: i64) -> bool {
        self.status && self.expires_at > now_ms
    }
}

/// Admin tier together with its password hash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminState {
    pub tier: AdminTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

/// One entry in a user's event list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMembership {
    pub event_id: String,
}

/// A platform user, keyed externally by their Telegram id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub telegram_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub department: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub events: Vec<EventMembership>,
    /// Epoch milliseconds
    pub created: i64,
    pub banned: BanState,
    pub admin: AdminState,
}

/// Profile data as delivered by the Telegram login widget.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramProfile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// External identity used to create or refresh a user.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramIdentity {
    pub id: i64,
    #[serde(flatten)]
    pub profile: TelegramProfile,
}

/// Which columns a user read may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserProjection {
    /// Everything except the admin password hash
    #[default]
    Public,
    /// Includes the admin password hash
    Full,
}

/// Criteria for filtered user listings.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub department: Option<String>,
    pub event_id: Option<String>,
    pub banned: Option<bool>,
    pub tier: Option<AdminTier>,
}

/// Sortable user columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserSortField {
    #[default]
    Created,
    Username,
    FirstName,
    LastName,
}

impl UserSortField {
    pub fn column(self) -> &'static str {
        match self {
            UserSortField::Created => "created",
            UserSortField::Username => "username",
            UserSortField::FirstName => "first_name",
            UserSortField::LastName => "last_name",
        }
    }

}

impl FromStr for UserSortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(UserSortField::Created),
            "username" => Ok(UserSortField::Username),
            "firstName" => Ok(UserSortField::FirstName),
            "lastName" => Ok(UserSortField::LastName),
            other => Err(format!("Cannot sort users by '{}'", other)),
        }
    }
}

/// Ordering for user listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserSort {
    pub field: UserSortField,
    pub descending: bool,
}

/// Request body for banning a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    pub duration_ms: i64,
}

/// Request body for escalating a user to an admin tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteRequest {
    pub tier: AdminTier,
    pub password_hash: String,
}

/// Request body for assigning a department.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRequest {
    pub department_id: String,
}

/// Request body for setting the delivery chat id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChatRequest {
    pub telegram_chat_id: String,
}

/// Request body for adding an event membership.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub event_id: String,
}
