//! Network Layer
//!
//! WebSocket transport for chat clients: token validation, the JSON wire
//! protocol and the connection lifecycle. All chat state lives in `chat/`.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token};
pub use protocol::{
    ClientMessage, ServerMessage, RejectReason, DisconnectReason, ServerError, ErrorCode,
};
pub use server::{ChatServer, ServerConfig, ChatServerError};
