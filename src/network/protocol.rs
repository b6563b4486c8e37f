//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged with a snake_case `type` field.

use serde::{Deserialize, Serialize};

use crate::core::ban::{BanDetail, BanTarget};
use crate::core::message::{ChatMessage, PresenceEntry};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate and enter the chat.
    Join {
        /// Bearer token.
        token: String,
    },

    /// Post a message to everyone.
    SendMessage {
        /// Message text.
        body: String,
    },

    /// Admin: ban an account.
    BanAccount {
        /// Account to ban.
        account_id: String,
        /// Reason shown to the user.
        reason: String,
        /// Duration in minutes. Absent means permanent.
        #[serde(default)]
        duration_minutes: Option<u32>,
    },

    /// Admin: ban a network address.
    BanAddress {
        /// Address to ban.
        address: String,
        /// Reason shown to the user.
        reason: String,
        /// Duration in minutes. Absent means permanent.
        #[serde(default)]
        duration_minutes: Option<u32>,
    },

    /// Admin: lift a ban.
    Unban {
        /// Account or address.
        target: BanTarget,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Joined {
        /// Account id.
        account_id: String,
        /// Display name.
        display_name: String,
        /// Admin flag.
        is_admin: bool,
        /// Server version.
        server_version: String,
    },

    /// Join refused; the connection closes afterwards.
    JoinRejected {
        /// Why.
        reason: RejectReason,
        /// Ban details when `reason` is `banned`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<BanDetail>,
    },

    /// One-time history replay for a newly joined client, oldest first.
    RecentMessages {
        /// Messages.
        messages: Vec<ChatMessage>,
    },

    /// A message broadcast to everyone.
    NewMessage {
        /// The message.
        message: ChatMessage,
    },

    /// Current online roster.
    Presence {
        /// Online users.
        users: Vec<PresenceEntry>,
    },

    /// The server is about to close this connection.
    ForcedDisconnect {
        /// Why.
        reason: DisconnectReason,
        /// Ban details when `reason` is `banned`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<BanDetail>,
    },

    /// Outcome of an admin command.
    AdminResult {
        /// Whether the command was applied.
        ok: bool,
        /// Sessions evicted as a result.
        evicted: usize,
        /// Failure description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time (Unix ms).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Reason text.
        reason: String,
    },
}

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Token invalid or expired.
    InvalidCredential,
    /// Account or address is banned.
    Banned,
}

/// Why the server closed an admitted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Account or address banned.
    Banned,
    /// Signed in elsewhere.
    Superseded,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed frame.
    InvalidInput,
    /// Command requires a joined session.
    NotJoined,
    /// Command requires admin rights.
    NotAuthorized,
    /// Message rejected by the relay.
    MessageRejected,
}

impl ServerMessage {
    /// Error frame helper.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }

    /// Whether the writer should close the socket after sending this frame.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerMessage::ForcedDisconnect { .. }
                | ServerMessage::JoinRejected { .. }
                | ServerMessage::Shutdown { .. }
        )
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from a binary frame holding UTF-8 JSON.
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
