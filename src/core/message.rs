//! Chat messages and roster entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::identity::Identity;

/// A chat message as persisted and broadcast.
///
/// Created by the relay on receipt and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identifier.
    pub id: Uuid,
    /// Sender display name at send time.
    pub display_name: String,
    /// Message text.
    pub body: String,
    /// Whether the sender was an admin.
    pub is_admin: bool,
    /// Server receive time.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Stamp a new message from `sender` with the current time.
    pub fn new(sender: &Identity, body: impl Into<String>) -> Self {
        Self::at(sender, body, Utc::now())
    }

    /// Stamp a new message with an explicit timestamp.
    pub fn at(sender: &Identity, body: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: sender.display_name.clone(),
            body: body.into(),
            is_admin: sender.is_admin,
            timestamp,
        }
    }
}

/// One line of the online roster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Display name.
    pub display_name: String,
    /// Admin badge.
    pub is_admin: bool,
}

impl From<&Identity> for PresenceEntry {
    fn from(identity: &Identity) -> Self {
        Self {
            display_name: identity.display_name.clone(),
            is_admin: identity.is_admin,
        }
    }
}
