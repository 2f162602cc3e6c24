//! Message store: the ordered, persisted conversation.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::{Author, Citation, Feedback, Message};
use crate::storage::{Snapshot, Storage};

/// Ordered conversation, never empty, backed by a snapshot in [`Storage`].
pub struct MessageStore {
    messages: Vec<Message>,
    storage: Arc<dyn Storage>,
    key: String,
}

impl MessageStore {
    /// A fresh conversation holding only the seed greeting
    pub fn seeded(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::greeting()],
            storage,
            key: key.into(),
        }
    }

    /// Load the snapshot for `key`, repairing it, or seed a fresh conversation
    pub async fn load(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let snapshot = match storage.get_snapshot(&key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read conversation snapshot");
                None
            }
        };

        let messages = snapshot
            .map(|s| rehydrate(&s.payload))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| vec![Message::greeting()]);

        debug!(key = %key, messages = messages.len(), "Conversation loaded");
        Self {
            messages,
            storage,
            key,
        }
    }

    /// All messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Look up a message by id
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Snapshot key this store persists under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Conversation starters are offered until the first turn
    pub fn shows_starters(&self) -> bool {
        self.messages.len() <= 1
    }

    /// Append messages to the tail in one step and persist
    pub async fn append(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.persist().await;
    }

    /// Mutate the last message if it is an AI message.
    ///
    /// Returns whether the transform ran.
    pub fn update_last(&mut self, transform: impl FnOnce(&mut Message)) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.is_ai() => {
                transform(last);
                true
            }
            _ => false,
        }
    }

    /// Overwrite the trailing AI message's content, or append `message`
    /// when the tail is not an AI message. Sources on the overwritten
    /// message are dropped.
    pub async fn replace_last(&mut self, message: Message) {
        let replaced = self.update_last(|last| {
            last.content = message.content.clone();
            last.sources = message.sources.clone();
        });
        if !replaced {
            self.messages.push(message);
        }
        self.persist().await;
    }

    /// Reset to the seed greeting and remove the persisted snapshot
    pub async fn clear(&mut self) {
        self.messages = vec![Message::greeting()];
        if let Err(e) = self.storage.delete_snapshot(&self.key).await {
            warn!(key = %self.key, error = %e, "Failed to delete conversation snapshot");
        }
    }

    /// Toggle feedback on a message; `None` when the id is unknown,
    /// otherwise the resulting value.
    pub async fn set_feedback(
        &mut self,
        id: &str,
        value: Feedback,
    ) -> Option<Option<Feedback>> {
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        message.feedback = Feedback::toggle(message.feedback, value);
        let result = message.feedback;
        self.persist().await;
        Some(result)
    }

    /// Write the snapshot if the conversation has grown beyond the greeting
    pub async fn persist(&self) {
        if self.messages.len() <= 1 {
            return;
        }

        let payload = match serde_json::to_string(&self.messages) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to serialize conversation");
                return;
            }
        };

        if let Err(e) = self
            .storage
            .put_snapshot(&Snapshot::new(&self.key, payload))
            .await
        {
            warn!(key = %self.key, error = %e, "Failed to persist conversation snapshot");
        }
    }
}

/// Snapshot entry as it may appear on disk, with every repairable field optional.
#[derive(Deserialize)]
struct StoredMessage {
    #[serde(default)]
    id: Option<String>,
    author: Author,
    #[serde(default)]
    content: String,
    #[serde(default)]
    sources: Option<Vec<Citation>>,
    #[serde(default)]
    feedback: Option<Feedback>,
}

/// Decode a snapshot payload, synthesizing missing ids and defaults.
///
/// Entries that cannot be decoded are skipped; an undecodable payload
/// yields an empty list.
pub fn rehydrate(payload: &str) -> Vec<Message> {
    let entries: Vec<serde_json::Value> = match serde_json::from_str(payload) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Discarding malformed conversation snapshot");
            return Vec::new();
        }
    };

    let stamp = Utc::now().timestamp_millis();
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<StoredMessage>(entry) {
            Ok(stored) => Some(Message {
                id: stored
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("{}-{}-{}", stored.author, stamp, index)),
                author: stored.author,
                content: stored.content,
                sources: stored.sources.unwrap_or_default(),
                feedback: stored.feedback,
            }),
            Err(e) => {
                warn!(index, error = %e, "Skipping undecodable snapshot entry");
                None
            }
        })
        .collect()
}
