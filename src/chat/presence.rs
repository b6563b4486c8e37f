//! Presence Broadcaster
//!
//! Roster snapshots and their fan-out. Always called by the registry with the
//! session lock held, right after the membership change it reports.

use tracing::trace;

use crate::chat::registry::{fan_out, Session};
use crate::core::message::PresenceEntry;
use crate::network::protocol::ServerMessage;

/// Roster in registry order.
pub fn snapshot(sessions: &[Session]) -> Vec<PresenceEntry> {
    sessions
        .iter()
        .map(|s| PresenceEntry::from(&s.identity))
        .collect()
}

/// Push the roster to every session. Returns how many queues accepted it.
pub fn announce(sessions: &[Session]) -> usize {
    let users = snapshot(sessions);
    let online = users.len();
    let delivered = fan_out(sessions, &ServerMessage::Presence { users });
    trace!(online, delivered, "Presence announced");
    delivered
}
