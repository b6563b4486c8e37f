//! Session Registry
//!
//! Authoritative set of joined connections. One mutex guards the session list
//! and every operation that mutates or enumerates it, including every
//! broadcast, so all sessions observe the same global order of presence and
//! message events.
//!
//! Nothing awaits while the lock is held except the lock itself: delivery is a
//! non-blocking `try_send` into each connection's outbound queue, and ban
//! lookups happen before the critical section.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::chat::presence;
use crate::core::ban::{BanDetail, BanTarget, CloseReason};
use crate::core::identity::{AccountId, ConnectionId, Identity};
use crate::core::message::PresenceEntry;
use crate::directory::bans::BanDirectory;
use crate::network::protocol::{DisconnectReason, ServerMessage};

/// Outbound side of one connection, handed to the registry on admission.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Queue drained by the connection's writer task.
    pub outbound: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    /// Create a handle for a fresh connection.
    pub fn new(outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: ConnectionId::generate(),
            outbound,
        }
    }
}

/// Per-recipient delivery failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Outbound queue is full; the client is not keeping up.
    #[error("outbound queue full")]
    QueueFull,
    /// Writer task is gone.
    #[error("connection closed")]
    Closed,
}

/// Admission errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmitError {
    /// Account or origin address is banned right now.
    #[error("banned: {}", .0.reason)]
    AlreadyBanned(BanDetail),
    /// This connection already holds a session.
    #[error("connection already joined")]
    AlreadyJoined,
}

/// A joined connection.
#[derive(Debug)]
pub struct Session {
    /// Who is connected.
    pub identity: Identity,
    /// Connection identifier.
    pub connection_id: ConnectionId,
    /// Remote address (canonical IP string).
    pub origin_address: String,
    /// Admission time.
    pub joined_at: DateTime<Utc>,
    outbound: mpsc::Sender<ServerMessage>,
    close_tx: Option<oneshot::Sender<CloseReason>>,
}

impl Session {
    /// Queue a frame for this connection without waiting.
    pub fn deliver(&self, message: ServerMessage) -> Result<(), DeliveryError> {
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Copy of the descriptive fields.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            identity: self.identity.clone(),
            connection_id: self.connection_id,
            origin_address: self.origin_address.clone(),
            joined_at: self.joined_at,
        }
    }

    /// Whether a ban on `target` applies to this session.
    pub fn matches(&self, target: &BanTarget) -> bool {
        match target {
            BanTarget::Account(id) => &self.identity.account_id == id,
            BanTarget::Address(addr) => &self.origin_address == addr,
        }
    }

    /// Tell the client why it is being dropped, then signal its task.
    fn close(mut self, reason: CloseReason) {
        let frame = match &reason {
            CloseReason::Banned(detail) => ServerMessage::ForcedDisconnect {
                reason: DisconnectReason::Banned,
                detail: Some(detail.clone()),
            },
            CloseReason::Superseded => ServerMessage::ForcedDisconnect {
                reason: DisconnectReason::Superseded,
                detail: None,
            },
        };
        if let Err(e) = self.deliver(frame) {
            debug!(conn = %self.connection_id, error = %e, "Close notice not delivered");
        }
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(reason);
        }
    }
}

/// Point-in-time copy of a session's descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Who is connected.
    pub identity: Identity,
    /// Connection identifier.
    pub connection_id: ConnectionId,
    /// Remote address.
    pub origin_address: String,
    /// Admission time.
    pub joined_at: DateTime<Utc>,
}

/// Returned to the connection task on successful admission.
#[derive(Debug)]
pub struct Admission {
    /// The admitted session.
    pub info: SessionInfo,
    /// Fires (or errors, when dropped) once the registry lets go of the
    /// session for any reason other than the task's own `remove`.
    pub closed: oneshot::Receiver<CloseReason>,
}

/// Queue `message` to every session. Failures are per recipient.
pub(crate) fn fan_out(sessions: &[Session], message: &ServerMessage) -> usize {
    let mut delivered = 0;
    for session in sessions {
        match session.deliver(message.clone()) {
            Ok(()) => delivered += 1,
            Err(DeliveryError::QueueFull) => {
                warn!(conn = %session.connection_id, "Outbound queue full, frame dropped");
            }
            Err(DeliveryError::Closed) => {
                debug!(conn = %session.connection_id, "Frame to closed connection dropped");
            }
        }
    }
    delivered
}

/// The session registry.
pub struct SessionRegistry {
    /// Sessions in admission order; roster order follows it.
    sessions: Mutex<Vec<Session>>,
    bans: Arc<dyn BanDirectory>,
}

impl SessionRegistry {
    /// Create an empty registry that checks `bans` on admission.
    pub fn new(bans: Arc<dyn BanDirectory>) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            bans,
        }
    }

    /// Admit an authenticated connection.
    ///
    /// `welcome` frames are queued to the new session before anything else it
    /// will ever receive. An existing session of the same account is
    /// superseded.
    pub async fn admit(
        &self,
        identity: Identity,
        handle: ConnectionHandle,
        origin_address: &str,
        welcome: Vec<ServerMessage>,
    ) -> Result<Admission, AdmitError> {
        let now = Utc::now();
        let account = self.bans.account_ban(&identity.account_id, now).await;
        if let Some(detail) = account.detail() {
            info!(account = %identity.account_id, reason = %detail.reason, "Join refused: account banned");
            return Err(AdmitError::AlreadyBanned(detail));
        }
        let address = self.bans.address_ban(origin_address, now).await;
        if let Some(detail) = address.detail() {
            info!(address = %origin_address, reason = %detail.reason, "Join refused: address banned");
            return Err(AdmitError::AlreadyBanned(detail));
        }

        let (close_tx, closed) = oneshot::channel();
        let session = Session {
            identity,
            connection_id: handle.id,
            origin_address: origin_address.to_string(),
            joined_at: now,
            outbound: handle.outbound,
            close_tx: Some(close_tx),
        };
        let info = session.info();

        let mut sessions = self.sessions.lock().await;
        if sessions.iter().any(|s| s.connection_id == info.connection_id) {
            return Err(AdmitError::AlreadyJoined);
        }

        if let Some(pos) = sessions
            .iter()
            .position(|s| s.identity.account_id == info.identity.account_id)
        {
            let old = sessions.remove(pos);
            info!(
                account = %old.identity.account_id,
                old_conn = %old.connection_id,
                new_conn = %info.connection_id,
                "Session superseded"
            );
            old.close(CloseReason::Superseded);
            presence::announce(&sessions);
        }

        for frame in welcome {
            if let Err(e) = session.deliver(frame) {
                warn!(conn = %session.connection_id, error = %e, "Welcome frame dropped");
            }
        }
        sessions.push(session);
        presence::announce(&sessions);

        info!(
            conn = %info.connection_id,
            account = %info.identity.account_id,
            online = sessions.len(),
            "Session admitted"
        );

        Ok(Admission { info, closed })
    }

    /// Remove a session after a plain disconnect.
    ///
    /// Idempotent: an unknown handle is a no-op and produces no broadcast.
    pub async fn remove(&self, connection_id: ConnectionId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(pos) = sessions.iter().position(|s| s.connection_id == connection_id) else {
            return false;
        };
        let session = sessions.remove(pos);
        presence::announce(&sessions);

        info!(
            conn = %connection_id,
            account = %session.identity.account_id,
            online = sessions.len(),
            "Session removed"
        );
        true
    }

    /// Remove a session and tell its client why.
    pub async fn evict(&self, connection_id: ConnectionId, reason: CloseReason) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(pos) = sessions.iter().position(|s| s.connection_id == connection_id) else {
            return false;
        };
        let session = sessions.remove(pos);
        info!(
            conn = %connection_id,
            account = %session.identity.account_id,
            reason = ?reason,
            "Session evicted"
        );
        session.close(reason);
        presence::announce(&sessions);
        true
    }

    /// Evict every session a ban on `target` applies to.
    ///
    /// All matches leave the set before anyone is told, so an evicted session
    /// never sees a roster. Each departure is then announced to the remaining
    /// sessions.
    pub async fn evict_matching(&self, target: &BanTarget, detail: &BanDetail) -> usize {
        let mut sessions = self.sessions.lock().await;
        let (evicted, kept): (Vec<Session>, Vec<Session>) =
            std::mem::take(&mut *sessions)
                .into_iter()
                .partition(|s| s.matches(target));
        *sessions = kept;

        let count = evicted.len();
        for session in evicted {
            info!(
                conn = %session.connection_id,
                account = %session.identity.account_id,
                ban_target = %target,
                "Session evicted by ban"
            );
            session.close(CloseReason::Banned(detail.clone()));
            presence::announce(&sessions);
        }
        count
    }

    /// Current roster, from one consistent view.
    pub async fn snapshot(&self) -> Vec<PresenceEntry> {
        let sessions = self.sessions.lock().await;
        presence::snapshot(&sessions)
    }

    /// Push the current roster to everyone.
    pub async fn announce(&self) -> usize {
        let sessions = self.sessions.lock().await;
        presence::announce(&sessions)
    }

    /// Apply `f` to every live session under the registry lock.
    ///
    /// `f` cannot change membership; callers that decide to drop sessions
    /// collect ids and call [`SessionRegistry::evict`] afterwards.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Session),
    {
        let sessions = self.sessions.lock().await;
        for session in sessions.iter() {
            f(session);
        }
    }

    /// Broadcast the frame built by `build` on behalf of `from`.
    ///
    /// `build` runs inside the critical section, so anything it stamps (time,
    /// queue position) follows the global broadcast order. Returns `None`
    /// without calling it if `from` is no longer a member, so an evicted
    /// sender cannot slip a message in after removal.
    pub async fn broadcast_from<F>(&self, from: ConnectionId, build: F) -> Option<usize>
    where
        F: FnOnce() -> ServerMessage,
    {
        let sessions = self.sessions.lock().await;
        if !sessions.iter().any(|s| s.connection_id == from) {
            return None;
        }
        let message = build();
        Some(fan_out(&sessions, &message))
    }

    /// Point-in-time copy of all sessions.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        sessions.iter().map(Session::info).collect()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether nobody is online.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Whether `account_id` currently holds a session.
    pub async fn contains_account(&self, account_id: &AccountId) -> bool {
        let sessions = self.sessions.lock().await;
        sessions.iter().any(|s| &s.identity.account_id == account_id)
    }
}
