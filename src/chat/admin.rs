//! Admin ban commands.
//!
//! Records a ban with the directory and then hands it to the watchdog so open
//! sessions are dropped immediately. Authority is checked here, on the
//! identity of the caller; the registry itself never looks at `is_admin`.

use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::chat::watchdog::AdminBanAction;
use crate::core::ban::{canonical_address, BanRecord, BanTarget};
use crate::core::identity::Identity;
use crate::directory::bans::BanLedger;

/// Admin command errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    /// Caller is not an admin.
    #[error("admin rights required")]
    NotAuthorized,
    /// No reason given.
    #[error("a ban reason is required")]
    MissingReason,
    /// Zero-length ban.
    #[error("ban duration must be at least one minute")]
    InvalidDuration,
    /// Target cannot be banned.
    #[error("invalid ban target: {0}")]
    InvalidTarget(String),
}

/// Admin ban service.
pub struct AdminBans {
    ledger: Arc<dyn BanLedger>,
    enforcer: Arc<dyn AdminBanAction>,
}

impl AdminBans {
    /// Create the service.
    pub fn new(ledger: Arc<dyn BanLedger>, enforcer: Arc<dyn AdminBanAction>) -> Self {
        Self { ledger, enforcer }
    }

    /// Ban `target` for `duration_minutes` (permanently when `None`).
    ///
    /// Returns the number of sessions evicted right away.
    pub async fn ban(
        &self,
        actor: &Identity,
        target: BanTarget,
        reason: &str,
        duration_minutes: Option<u32>,
    ) -> Result<usize, AdminError> {
        if !actor.is_admin {
            warn!(account = %actor.account_id, "Non-admin attempted a ban");
            return Err(AdminError::NotAuthorized);
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AdminError::MissingReason);
        }
        if duration_minutes == Some(0) {
            return Err(AdminError::InvalidDuration);
        }
        let target = normalize(target)?;
        if target == BanTarget::Account(actor.account_id.clone()) {
            return Err(AdminError::InvalidTarget("cannot ban yourself".into()));
        }

        let record = BanRecord::new(
            target,
            reason,
            duration_minutes.map(|m| Duration::minutes(i64::from(m))),
        );
        info!(
            admin = %actor.account_id,
            ban_target = %record.target,
            expires_at = ?record.expires_at,
            "Admin ban"
        );

        self.ledger.record(record.clone()).await;
        Ok(self
            .enforcer
            .notify(record.target, record.reason, record.expires_at)
            .await)
    }

    /// Remove a ban. Sessions are not affected; the target may simply join
    /// again.
    pub async fn unban(&self, actor: &Identity, target: BanTarget) -> Result<bool, AdminError> {
        if !actor.is_admin {
            return Err(AdminError::NotAuthorized);
        }
        let target = normalize(target)?;
        let lifted = self.ledger.lift(&target).await;
        info!(admin = %actor.account_id, ban_target = %target, lifted, "Admin unban");
        Ok(lifted)
    }
}

fn normalize(target: BanTarget) -> Result<BanTarget, AdminError> {
    match target {
        BanTarget::Account(id) if id.as_str().trim().is_empty() => {
            Err(AdminError::InvalidTarget("empty account id".into()))
        }
        BanTarget::Account(id) => Ok(BanTarget::Account(id)),
        BanTarget::Address(raw) => canonical_address(&raw)
            .map(BanTarget::Address)
            .ok_or_else(|| AdminError::InvalidTarget(format!("not an IP address: {}", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::registry::tests::TestClient;
    use crate::chat::registry::SessionRegistry;
    use crate::chat::watchdog::{BanWatchdog, WatchdogConfig};
    use crate::directory::bans::{BanDirectory, InMemoryBanDirectory};
    use chrono::Utc;

    struct Fixture {
        registry: Arc<SessionRegistry>,
        bans: Arc<InMemoryBanDirectory>,
        admin: AdminBans,
    }

    fn fixture() -> Fixture {
        let bans = Arc::new(InMemoryBanDirectory::new());
        let registry = Arc::new(SessionRegistry::new(bans.clone()));
        let watchdog = Arc::new(BanWatchdog::new(
            registry.clone(),
            bans.clone(),
            WatchdogConfig::default(),
        ));
        Fixture {
            admin: AdminBans::new(bans.clone(), watchdog),
            registry,
            bans,
        }
    }

    fn root() -> Identity {
        Identity::admin("root", "Root")
    }

    #[tokio::test]
    async fn test_non_admin_cannot_ban() {
        let f = fixture();
        let result = f
            .admin
            .ban(&Identity::new("ana", "Ana"), BanTarget::Account("bob".into()), "x", None)
            .await;
        assert_eq!(result.unwrap_err(), AdminError::NotAuthorized);
        assert!(f.bans.is_empty().await);
    }

    #[tokio::test]
    async fn test_ban_records_then_evicts() {
        let f = fixture();
        let a = TestClient::new();
        f.registry
            .admit(Identity::new("ana", "Ana"), a.handle.clone(), "10.0.0.1", Vec::new())
            .await
            .unwrap();

        let evicted = f
            .admin
            .ban(&root(), BanTarget::Account("ana".into()), " spam ", Some(60))
            .await
            .unwrap();

        assert_eq!(evicted, 1);
        let status = f.bans.account_ban(&"ana".into(), Utc::now()).await;
        assert!(status.active);
        assert_eq!(status.reason, "spam");
        let expires_at = status.expires_at.unwrap();
        assert!(expires_at > Utc::now() + Duration::minutes(59));
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_ban_validation() {
        let f = fixture();
        let target = BanTarget::Account("ana".into());

        assert_eq!(
            f.admin.ban(&root(), target.clone(), "  ", None).await.unwrap_err(),
            AdminError::MissingReason
        );
        assert_eq!(
            f.admin.ban(&root(), target, "x", Some(0)).await.unwrap_err(),
            AdminError::InvalidDuration
        );
        assert!(matches!(
            f.admin
                .ban(&root(), BanTarget::Address("not-an-ip".into()), "x", None)
                .await,
            Err(AdminError::InvalidTarget(_))
        ));
        assert!(matches!(
            f.admin.ban(&root(), BanTarget::Account("root".into()), "x", None).await,
            Err(AdminError::InvalidTarget(_))
        ));
        assert!(f.bans.is_empty().await);
    }

    #[tokio::test]
    async fn test_address_ban_is_canonicalized() {
        let f = fixture();
        let a = TestClient::new();
        f.registry
            .admit(Identity::new("ana", "Ana"), a.handle.clone(), "10.0.0.1", Vec::new())
            .await
            .unwrap();

        let evicted = f
            .admin
            .ban(&root(), BanTarget::Address("::ffff:10.0.0.1".into()), "flood", None)
            .await
            .unwrap();

        assert_eq!(evicted, 1);
        assert!(f.bans.address_ban("10.0.0.1", Utc::now()).await.active);
    }

    #[tokio::test]
    async fn test_unban() {
        let f = fixture();
        let target = BanTarget::Account("ana".into());
        f.admin.ban(&root(), target.clone(), "spam", None).await.unwrap();

        assert!(f.admin.unban(&root(), target.clone()).await.unwrap());
        assert!(!f.admin.unban(&root(), target.clone()).await.unwrap());
        assert_eq!(
            f.admin
                .unban(&Identity::new("ana", "Ana"), target)
                .await
                .unwrap_err(),
            AdminError::NotAuthorized
        );
    }
}
