//! Chat Core
//!
//! Sessions, presence, message fan-out and live ban enforcement.
//!
//! ## Module Structure
//!
//! - `registry`: authoritative session set, the single lock everything
//!   serializes through
//! - `presence`: roster snapshots and announcements
//! - `relay`: message validation, broadcast, persistence and join replay
//! - `watchdog`: periodic and admin-triggered ban enforcement
//! - `admin`: ban commands for admin identities
//! - `hub`: assembly and the join sequence

pub mod admin;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod watchdog;

// Re-export key types
pub use admin::{AdminBans, AdminError};
pub use hub::{ChatHub, HubConfig, JoinError};
pub use registry::{
    Admission, AdmitError, ConnectionHandle, DeliveryError, Session, SessionInfo, SessionRegistry,
};
pub use relay::{MessageRelay, RelayConfig, SubmitError};
pub use watchdog::{AdminBanAction, BanWatchdog, WatchdogConfig};
