//! Collaborators
//!
//! Interfaces the chat core calls out to, with the in-process
//! implementations the server runs on.

pub mod bans;
pub mod identity;
pub mod store;

pub use bans::{BanDirectory, BanLedger, InMemoryBanDirectory};
pub use identity::{IdentityError, IdentityProvider, JwtIdentityProvider};
pub use store::{InMemoryMessageStore, MessageStore, StoreError};
