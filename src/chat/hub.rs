//! Chat Hub
//!
//! Wires the registry, relay, watchdog and admin service to their
//! collaborators, and runs the join sequence: verify the credential, load the
//! history replay, then admit.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::chat::admin::AdminBans;
use crate::chat::registry::{Admission, AdmitError, ConnectionHandle, SessionInfo, SessionRegistry};
use crate::chat::relay::{MessageRelay, RelayConfig, SubmitError};
use crate::chat::watchdog::{BanWatchdog, WatchdogConfig};
use crate::core::identity::ConnectionId;
use crate::core::message::ChatMessage;
use crate::directory::bans::{BanDirectory, BanLedger};
use crate::directory::identity::{IdentityError, IdentityProvider};
use crate::directory::store::MessageStore;
use crate::network::protocol::ServerMessage;

/// Hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Relay settings.
    pub relay: RelayConfig,
    /// Watchdog settings.
    pub watchdog: WatchdogConfig,
}

/// Join errors.
#[derive(Debug, Error)]
pub enum JoinError {
    /// Credential did not verify.
    #[error(transparent)]
    InvalidCredential(#[from] IdentityError),
    /// Registry refused the session.
    #[error(transparent)]
    Admit(#[from] AdmitError),
}

/// The assembled chat core.
pub struct ChatHub {
    identity: Arc<dyn IdentityProvider>,
    ledger: Arc<dyn BanLedger>,
    registry: Arc<SessionRegistry>,
    relay: MessageRelay,
    watchdog: Arc<BanWatchdog>,
    admin: AdminBans,
    version: String,
}

impl ChatHub {
    /// Assemble the core around its collaborators.
    pub fn new<B>(
        identity: Arc<dyn IdentityProvider>,
        bans: Arc<B>,
        store: Arc<dyn MessageStore>,
        config: HubConfig,
    ) -> Self
    where
        B: BanLedger + 'static,
    {
        let directory: Arc<dyn BanDirectory> = bans.clone();
        let ledger: Arc<dyn BanLedger> = bans;

        let registry = Arc::new(SessionRegistry::new(directory.clone()));
        let relay = MessageRelay::new(registry.clone(), store, config.relay);
        let watchdog = Arc::new(BanWatchdog::new(
            registry.clone(),
            directory,
            config.watchdog,
        ));
        let admin = AdminBans::new(ledger.clone(), watchdog.clone());

        Self {
            identity,
            ledger,
            registry,
            relay,
            watchdog,
            admin,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Authenticate `credential` and admit the connection.
    ///
    /// The joiner's first frames are `joined` and `recent_messages`; the
    /// replay is loaded before admission so it cannot overlap with live
    /// broadcasts the new session receives.
    pub async fn join(
        &self,
        credential: &str,
        handle: ConnectionHandle,
        origin_address: &str,
    ) -> Result<Admission, JoinError> {
        let identity = self.identity.verify(credential).await?;
        let history = self.relay.recent_history().await;
        debug!(
            conn = %handle.id,
            account = %identity.account_id,
            replay = history.len(),
            "Credential verified"
        );

        let welcome = vec![
            ServerMessage::Joined {
                account_id: identity.account_id.to_string(),
                display_name: identity.display_name.clone(),
                is_admin: identity.is_admin,
                server_version: self.version.clone(),
            },
            ServerMessage::RecentMessages { messages: history },
        ];

        Ok(self
            .registry
            .admit(identity, handle, origin_address, welcome)
            .await?)
    }

    /// Relay a message from a joined session.
    pub async fn submit(&self, session: &SessionInfo, body: &str) -> Result<ChatMessage, SubmitError> {
        self.relay
            .submit(session.connection_id, &session.identity, body)
            .await
    }

    /// Drop a session after its connection ended.
    pub async fn leave(&self, connection_id: ConnectionId) -> bool {
        self.registry.remove(connection_id).await
    }

    /// Drop expired ban records from the directory.
    pub async fn prune_bans(&self) -> usize {
        self.ledger.prune_expired(chrono::Utc::now()).await
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Ban watchdog.
    pub fn watchdog(&self) -> &Arc<BanWatchdog> {
        &self.watchdog
    }

    /// Admin ban service.
    pub fn admin(&self) -> &AdminBans {
        &self.admin
    }
}
