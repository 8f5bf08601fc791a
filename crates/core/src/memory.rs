//! Conversation store trait, the durable side of agent memory.
//!
//! A store keeps every message of every conversation in insertion order and an
//! index row per conversation. Implementations live in `quill-memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::{ConversationId, Message};

/// Index row of a stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,

    pub title: String,

    pub created_at: DateTime<Utc>,

    /// Time of the most recent append
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ConversationSummary {
    /// Default title given to a conversation on its first write.
    pub fn default_title(id: &ConversationId) -> String {
        format!("Conversation {id}")
    }
}

/// Durable per-conversation message log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append a message, creating the conversation row on first write.
    async fn append(&self, conversation_id: &ConversationId, message: &Message) -> Result<(), MemoryError>;

    /// All messages of a conversation in insertion order. Unknown ids yield an empty list.
    async fn load(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, MemoryError>;

    /// Every conversation, most recently updated first.
    async fn list(&self) -> Result<Vec<ConversationSummary>, MemoryError>;

    /// Remove a conversation and its messages. Returns whether it existed.
    async fn delete(&self, conversation_id: &ConversationId) -> Result<bool, MemoryError>;

    /// Remove everything.
    async fn clear(&self) -> Result<(), MemoryError>;
}
