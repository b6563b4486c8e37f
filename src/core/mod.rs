//! Core domain types.
//!
//! Plain value data shared by the chat core, the collaborators and the
//! transport. Nothing here holds locks or performs I/O.

pub mod ban;
pub mod identity;
pub mod message;

// Re-export core types
pub use ban::{canonical_address, BanDetail, BanRecord, BanStatus, BanTarget, CloseReason};
pub use identity::{AccountId, ConnectionId, Identity};
pub use message::{ChatMessage, PresenceEntry};
