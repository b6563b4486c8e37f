//! Message Relay
//!
//! Validates inbound chat messages, fans them out through the registry and
//! appends them to the history store. Also serves the join-time replay.
//!
//! A message is stamped inside the registry's broadcast critical section and
//! queued, still inside it, to a single history writer task. The store thus
//! sees messages in broadcast order without being called under the lock.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::chat::registry::SessionRegistry;
use crate::core::identity::{ConnectionId, Identity};
use crate::core::message::ChatMessage;
use crate::directory::store::MessageStore;
use crate::network::protocol::ServerMessage;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Messages replayed to a joining client.
    pub history_limit: usize,
    /// Longest accepted body, in characters.
    pub max_message_len: usize,
    /// Capacity of the history writer queue.
    pub persist_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            max_message_len: 2000,
            persist_queue: 1024,
        }
    }
}

/// Submit errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Body is empty or whitespace only.
    #[error("empty message")]
    EmptyMessage,
    /// Body exceeds the configured limit.
    #[error("message too long ({len} > {max} characters)")]
    TooLong {
        /// Body length.
        len: usize,
        /// Limit.
        max: usize,
    },
    /// Sender is no longer in the registry.
    #[error("sender is not joined")]
    NotJoined,
}

/// Work for the history writer.
enum Persist {
    Append(ChatMessage),
    /// Acknowledged once everything queued before it has been written.
    Flush(oneshot::Sender<()>),
}

/// The message relay.
pub struct MessageRelay {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn MessageStore>,
    persist_tx: mpsc::Sender<Persist>,
    config: RelayConfig,
}

impl MessageRelay {
    /// Create a relay and spawn its history writer.
    ///
    /// Must be called within a tokio runtime. The writer stops when the relay
    /// is dropped.
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn MessageStore>,
        config: RelayConfig,
    ) -> Self {
        let (persist_tx, persist_rx) = mpsc::channel(config.persist_queue.max(1));
        tokio::spawn(persist_loop(store.clone(), persist_rx));

        Self {
            registry,
            store,
            persist_tx,
            config,
        }
    }

    /// Relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Broadcast and persist a message from a joined session.
    ///
    /// Rejected bodies have no side effects. Persistence is asynchronous; a
    /// store failure is logged and does not undo the broadcast.
    pub async fn submit(
        &self,
        connection_id: ConnectionId,
        sender: &Identity,
        body: &str,
    ) -> Result<ChatMessage, SubmitError> {
        if body.trim().is_empty() {
            return Err(SubmitError::EmptyMessage);
        }
        let len = body.chars().count();
        if len > self.config.max_message_len {
            return Err(SubmitError::TooLong {
                len,
                max: self.config.max_message_len,
            });
        }

        let mut relayed = None;
        let persist_tx = &self.persist_tx;
        let delivered = self
            .registry
            .broadcast_from(connection_id, || {
                let message = ChatMessage::new(sender, body);
                if let Err(e) = persist_tx.try_send(Persist::Append(message.clone())) {
                    error!(message_id = %message.id, error = %e, "History queue rejected message");
                }
                relayed = Some(message.clone());
                ServerMessage::NewMessage { message }
            })
            .await
            .ok_or(SubmitError::NotJoined)?;
        let message = relayed.ok_or(SubmitError::NotJoined)?;

        debug!(
            conn = %connection_id,
            account = %sender.account_id,
            message_id = %message.id,
            delivered,
            "Message relayed"
        );

        Ok(message)
    }

    /// Wait until every message relayed so far has reached the store.
    pub async fn flush(&self) {
        let (done, written) = oneshot::channel();
        if self.persist_tx.send(Persist::Flush(done)).await.is_ok() {
            let _ = written.await;
        }
    }

    /// Most recent history, oldest first. Empty if the store is unavailable.
    ///
    /// Includes every message relayed before the call.
    pub async fn recent_history(&self) -> Vec<ChatMessage> {
        self.flush().await;
        match self.store.recent(self.config.history_limit).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Failed to load recent messages");
                Vec::new()
            }
        }
    }
}

/// Append queued messages in order.
async fn persist_loop(store: Arc<dyn MessageStore>, mut rx: mpsc::Receiver<Persist>) {
    while let Some(job) = rx.recv().await {
        match job {
            Persist::Append(message) => {
                if let Err(e) = store.append(&message).await {
                    error!(message_id = %message.id, error = %e, "Failed to persist message");
                }
            }
            Persist::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("History writer stopped");
}
