//! Identities and connection identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque account identifier issued by the identity provider (JWT `sub`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Create an account id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one accepted socket.
///
/// Random per connection, so a reconnect from the same account always gets a
/// fresh id even when the old socket has not been reaped yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub [u8; 16]);

impl ConnectionId {
    /// Generate a new random connection id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }
}

impl fmt::Display for ConnectionId {
    /// Short hex form, enough to correlate log lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..4]))
    }
}

/// A verified user identity.
///
/// Immutable for the lifetime of a session; copied into the session on
/// admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account identifier.
    pub account_id: AccountId,
    /// Name shown in the roster and on messages.
    pub display_name: String,
    /// Admin flag (roster/message badge, admin commands).
    pub is_admin: bool,
}

impl Identity {
    /// Create a non-admin identity.
    pub fn new(account_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            account_id: AccountId::new(account_id),
            display_name: display_name.into(),
            is_admin: false,
        }
    }

    /// Create an admin identity.
    pub fn admin(account_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(account_id, display_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_connection_id_display_is_short_hex() {
        let id = ConnectionId([0xab; 16]);
        assert_eq!(id.to_string(), "abababab");
    }

    #[test]
    fn test_account_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&AccountId::new("u-1")).unwrap();
        assert_eq!(json, "\"u-1\"");
    }

    #[test]
    fn test_admin_constructor() {
        let id = Identity::admin("root", "Root");
        assert!(id.is_admin);
        assert_eq!(id.account_id.as_str(), "root");
    }
}
