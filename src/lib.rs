//! # Agora Chat Server
//!
//! Real-time chat sessions with presence tracking and live ban enforcement.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AGORA CHAT SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Domain values                             │
//! │  ├── identity.rs - Accounts, identities, connection ids      │
//! │  ├── message.rs  - Chat messages and roster entries          │
//! │  └── ban.rs      - Ban targets, records and close reasons    │
//! │                                                              │
//! │  directory/      - Collaborators behind traits               │
//! │  ├── identity.rs - Credential verification                   │
//! │  ├── bans.rs     - Ban lookups and the ban ledger            │
//! │  └── store.rs    - Message persistence                       │
//! │                                                              │
//! │  chat/           - Session core                              │
//! │  ├── registry.rs - Live sessions, one lock                   │
//! │  ├── presence.rs - Roster snapshots                          │
//! │  ├── relay.rs    - Validation, fan-out, replay               │
//! │  ├── watchdog.rs - Periodic and admin ban enforcement        │
//! │  ├── admin.rs    - Ban commands                              │
//! │  └── hub.rs      - Assembly and join sequence                │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── auth.rs     - JWT validation                            │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! Every session mutation, roster read and broadcast runs under the
//! registry's single lock, so all clients observe the same roster sequence
//! and a banned session can never send or receive after its eviction.
//! Delivery is non-blocking: a slow client loses frames, it never stalls
//! the room.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod chat;
pub mod core;
pub mod directory;
pub mod network;

// Re-export commonly used types
pub use crate::core::{AccountId, BanTarget, ChatMessage, ConnectionId, Identity, PresenceEntry};
pub use chat::{ChatHub, HubConfig, SessionRegistry};
pub use network::{ChatServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
