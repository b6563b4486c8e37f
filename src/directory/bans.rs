//! Ban directory.
//!
//! The directory owns ban records and is the only place that decides whether
//! a ban is in force. Callers always ask "active now"; expired records are
//! reported inactive whether or not they have been pruned yet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::ban::{BanRecord, BanStatus, BanTarget};
use crate::core::identity::AccountId;

/// Read side of the ban directory.
#[async_trait]
pub trait BanDirectory: Send + Sync {
    /// Ban status of an account at `now`.
    async fn account_ban(&self, account_id: &AccountId, now: DateTime<Utc>) -> BanStatus;

    /// Ban status of a network address at `now`.
    async fn address_ban(&self, address: &str, now: DateTime<Utc>) -> BanStatus;

    /// Ban status of any target at `now`.
    async fn status(&self, target: &BanTarget, now: DateTime<Utc>) -> BanStatus {
        match target {
            BanTarget::Account(id) => self.account_ban(id, now).await,
            BanTarget::Address(addr) => self.address_ban(addr, now).await,
        }
    }
}

/// Write side, used by the admin path.
#[async_trait]
pub trait BanLedger: BanDirectory {
    /// Durably record a ban, replacing any previous record for the target.
    async fn record(&self, record: BanRecord);

    /// Remove the record for `target`. Returns whether one existed.
    async fn lift(&self, target: &BanTarget) -> bool;

    /// Drop records that are no longer active. Returns how many were removed.
    async fn prune_expired(&self, now: DateTime<Utc>) -> usize;
}

/// In-process ban directory.
#[derive(Debug, Default)]
pub struct InMemoryBanDirectory {
    records: RwLock<BTreeMap<BanTarget, BanRecord>>,
}

impl InMemoryBanDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, active or not.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the directory holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn lookup(&self, target: &BanTarget, now: DateTime<Utc>) -> BanStatus {
        let records = self.records.read().await;
        records
            .get(target)
            .map(|r| BanStatus::from_record(r, now))
            .unwrap_or_else(BanStatus::inactive)
    }
}

#[async_trait]
impl BanDirectory for InMemoryBanDirectory {
    async fn account_ban(&self, account_id: &AccountId, now: DateTime<Utc>) -> BanStatus {
        self.lookup(&BanTarget::Account(account_id.clone()), now).await
    }

    async fn address_ban(&self, address: &str, now: DateTime<Utc>) -> BanStatus {
        self.lookup(&BanTarget::Address(address.to_string()), now).await
    }
}

#[async_trait]
impl BanLedger for InMemoryBanDirectory {
    async fn record(&self, record: BanRecord) {
        info!(
            ban_target = %record.target,
            reason = %record.reason,
            expires_at = ?record.expires_at,
            "Ban recorded"
        );
        self.records.write().await.insert(record.target.clone(), record);
    }

    async fn lift(&self, target: &BanTarget) -> bool {
        let removed = self.records.write().await.remove(target).is_some();
        if removed {
            info!(ban_target = %target, "Ban lifted");
        }
        removed
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.is_active_at(now));
        let pruned = before - records.len();
        if pruned > 0 {
            debug!(pruned, "Pruned expired bans");
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_unknown_target_not_banned() {
        let dir = InMemoryBanDirectory::new();
        let status = dir.account_ban(&"u1".into(), Utc::now()).await;
        assert!(!status.active);
    }

    #[tokio::test]
    async fn test_account_and_address_are_separate() {
        let dir = InMemoryBanDirectory::new();
        dir.record(BanRecord::new(BanTarget::Address("10.0.0.1".into()), "flood", None))
            .await;

        let now = Utc::now();
        assert!(dir.address_ban("10.0.0.1", now).await.active);
        assert!(!dir.address_ban("10.0.0.2", now).await.active);
        assert!(!dir.account_ban(&"10.0.0.1".into(), now).await.active);
    }

    #[tokio::test]
    async fn test_expired_ban_reads_inactive_before_prune() {
        let dir = InMemoryBanDirectory::new();
        let record = BanRecord::new(
            BanTarget::Account("u1".into()),
            "spam",
            Some(Duration::minutes(5)),
        );
        let later = record.banned_at + Duration::minutes(6);
        dir.record(record).await;

        assert!(!dir.account_ban(&"u1".into(), later).await.active);
        assert_eq!(dir.len().await, 1);

        assert_eq!(dir.prune_expired(later).await, 1);
        assert!(dir.is_empty().await);
    }

    #[tokio::test]
    async fn test_active_status_carries_detail() {
        let dir = InMemoryBanDirectory::new();
        dir.record(BanRecord::new(
            BanTarget::Account("u1".into()),
            "rude",
            Some(Duration::hours(1)),
        ))
        .await;

        let status = dir.status(&BanTarget::Account("u1".into()), Utc::now()).await;
        assert!(status.active);
        assert_eq!(status.reason, "rude");
        assert!(status.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_lift_removes_record() {
        let dir = InMemoryBanDirectory::new();
        let target = BanTarget::Account("u1".into());
        dir.record(BanRecord::new(target.clone(), "x", None)).await;

        assert!(dir.lift(&target).await);
        assert!(!dir.lift(&target).await);
        assert!(!dir.status(&target, Utc::now()).await.active);
    }
}
