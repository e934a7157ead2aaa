//! User Data Structures
//!
//! Only the fields the messaging core reads or writes. Registration,
//! credentials and profile editing live outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub picture_url: Option<String>,
    /// Presence flag, written only by the presence tracker
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    /// Connection currently bound to this user, if any
    pub socket_id: Option<Uuid>,
}

impl User {
    /// A new, offline user
    pub fn new(name: impl Into<String>, picture_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            picture_url,
            is_online: false,
            last_seen: Utc::now(),
            socket_id: None,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            picture_url: self.picture_url.clone(),
        }
    }
}

/// Public profile fields attached to messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub picture_url: Option<String>,
}

/// Payload of `user-status-changed`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl From<&User> for PresenceChange {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_online: user.is_online,
            last_seen: user.last_seen,
        }
    }
}
