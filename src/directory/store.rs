//! Message history store.

use async_trait::async_trait;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::message::ChatMessage;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend rejected or lost the write.
    #[error("append failed: {0}")]
    AppendFailed(String),
    /// Backend could not be read.
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Append-only message history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message.
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// The most recent `limit` messages, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;
}

/// In-process history with bounded retention.
#[derive(Debug)]
pub struct InMemoryMessageStore {
    messages: RwLock<VecDeque<ChatMessage>>,
    retain: usize,
}

impl InMemoryMessageStore {
    /// Default number of retained messages.
    pub const DEFAULT_RETAIN: usize = 1000;

    /// Create a store keeping the newest `retain` messages.
    pub fn new(retain: usize) -> Self {
        Self {
            messages: RwLock::new(VecDeque::new()),
            retain: retain.max(1),
        }
    }

    /// Stored message count.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETAIN)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        messages.push_back(message.clone());
        while messages.len() > self.retain {
            messages.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.messages.read().await;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.iter().skip(skip).cloned().collect())
    }
}
