//! Ban records and the answers the directory gives about them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::core::identity::AccountId;

/// What a ban applies to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BanTarget {
    /// A single account.
    Account(AccountId),
    /// A network address (textual IP, as seen by the server).
    Address(String),
}

impl fmt::Display for BanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanTarget::Account(id) => write!(f, "account:{}", id),
            BanTarget::Address(addr) => write!(f, "address:{}", addr),
        }
    }
}

/// A ban as stored by the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    /// Banned account or address.
    pub target: BanTarget,
    /// Reason shown to the banned user.
    pub reason: String,
    /// When the ban was recorded.
    pub banned_at: DateTime<Utc>,
    /// Expiry. `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,
}

impl BanRecord {
    /// Create a ban starting now that lasts `duration` (or forever).
    pub fn new(target: BanTarget, reason: impl Into<String>, duration: Option<Duration>) -> Self {
        let banned_at = Utc::now();
        Self {
            target,
            reason: reason.into(),
            banned_at,
            expires_at: duration.map(|d| banned_at + d),
        }
    }

    /// Whether the ban is in force at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    /// Client-facing detail.
    pub fn detail(&self) -> BanDetail {
        BanDetail {
            reason: self.reason.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Canonical textual form of an IP address, or `None` if `raw` is not one.
///
/// IPv4-mapped IPv6 addresses collapse to their IPv4 form so a ban on
/// `1.2.3.4` also matches a dual-stack listener reporting `::ffff:1.2.3.4`.
pub fn canonical_address(raw: &str) -> Option<String> {
    raw.trim()
        .parse::<IpAddr>()
        .ok()
        .map(|ip| ip.to_canonical().to_string())
}

/// Ban reason and expiry delivered to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanDetail {
    /// Reason text.
    pub reason: String,
    /// Expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Answer to "is X banned right now".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BanStatus {
    /// Whether a ban is currently in force.
    pub active: bool,
    /// Reason (empty when inactive).
    pub reason: String,
    /// Expiry of the active ban.
    pub expires_at: Option<DateTime<Utc>>,
}

impl BanStatus {
    /// Not banned.
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Evaluate a stored record at `now`.
    pub fn from_record(record: &BanRecord, now: DateTime<Utc>) -> Self {
        if record.is_active_at(now) {
            Self {
                active: true,
                reason: record.reason.clone(),
                expires_at: record.expires_at,
            }
        } else {
            Self::inactive()
        }
    }

    /// Client-facing detail for an active status.
    pub fn detail(&self) -> Option<BanDetail> {
        self.active.then(|| BanDetail {
            reason: self.reason.clone(),
            expires_at: self.expires_at,
        })
    }
}

/// Why the server closed a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Account or address was banned.
    Banned(BanDetail),
    /// Same account signed in elsewhere.
    Superseded,
}
