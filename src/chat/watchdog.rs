//! Ban Enforcement Watchdog
//!
//! Reconciles live sessions against the ban directory. Two paths lead to the
//! same eviction:
//!
//! - a periodic sweep that asks the directory about every session, and
//! - [`AdminBanAction::notify`], called right after an admin records a ban,
//!   which evicts matching sessions without waiting for the next tick.
//!
//! The watchdog never lifts anything. A ban that expires mid-session simply
//! stops matching on the next sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::chat::registry::{SessionInfo, SessionRegistry};
use crate::core::ban::{canonical_address, BanDetail, BanTarget, CloseReason};
use crate::directory::bans::BanDirectory;

/// Watchdog configuration.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Time between periodic sweeps.
    pub sweep_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Hook the admin path calls after durably recording a ban.
#[async_trait]
pub trait AdminBanAction: Send + Sync {
    /// Enforce a freshly recorded ban. Returns the number of evicted sessions.
    async fn notify(
        &self,
        target: BanTarget,
        reason: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> usize;
}

/// The ban enforcement watchdog.
pub struct BanWatchdog {
    registry: Arc<SessionRegistry>,
    bans: Arc<dyn BanDirectory>,
    config: WatchdogConfig,
}

impl BanWatchdog {
    /// Create a watchdog.
    pub fn new(
        registry: Arc<SessionRegistry>,
        bans: Arc<dyn BanDirectory>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            registry,
            bans,
            config,
        }
    }

    /// Check every live session once. Returns the number evicted.
    ///
    /// Directory lookups run on a copy of the session list, outside the
    /// registry lock; a session that left in the meantime is skipped by
    /// [`SessionRegistry::evict`].
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut evicted = 0;

        for session in self.registry.sessions().await {
            if let Some(detail) = self.active_ban(&session, now).await {
                if self
                    .registry
                    .evict(session.connection_id, CloseReason::Banned(detail))
                    .await
                {
                    evicted += 1;
                }
            }
        }

        evicted
    }

    async fn active_ban(&self, session: &SessionInfo, now: DateTime<Utc>) -> Option<BanDetail> {
        let account = self.bans.account_ban(&session.identity.account_id, now).await;
        if let Some(detail) = account.detail() {
            return Some(detail);
        }
        self.bans
            .address_ban(&session.origin_address, now)
            .await
            .detail()
    }

    /// Sweep on a fixed interval until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.config.sweep_interval, "Ban watchdog started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep().await;
                    if evicted > 0 {
                        info!(evicted, "Sweep evicted banned sessions");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Ban watchdog stopping");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl AdminBanAction for BanWatchdog {
    async fn notify(
        &self,
        target: BanTarget,
        reason: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> usize {
        if expires_at.is_some_and(|at| at <= Utc::now()) {
            debug!(ban_target = %target, "Ignoring already expired ban");
            return 0;
        }

        let target = match target {
            BanTarget::Address(raw) => match canonical_address(&raw) {
                Some(address) => BanTarget::Address(address),
                None => {
                    warn!(address = %raw, "Ignoring ban on unparseable address");
                    return 0;
                }
            },
            account => account,
        };

        let detail = BanDetail { reason, expires_at };
        let evicted = self.registry.evict_matching(&target, &detail).await;
        info!(ban_target = %target, evicted, "Ban enforced");
        evicted
    }
}
