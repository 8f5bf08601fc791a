//! In-memory conversation store, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use quill_core::error::MemoryError;
use quill_core::memory::{ConversationStore, ConversationSummary};
use quill_core::message::{ConversationId, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    /// Most recently updated first
    conversations: Vec<ConversationSummary>,
    messages: HashMap<ConversationId, Vec<Message>>,
}

/// A conversation store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, conversation_id: &ConversationId, message: &Message) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let mut summary = match state.conversations.iter().position(|c| &c.id == conversation_id) {
            Some(pos) => state.conversations.remove(pos),
            None => ConversationSummary {
                id: conversation_id.clone(),
                title: ConversationSummary::default_title(conversation_id),
                created_at: now,
                updated_at: now,
                metadata: serde_json::Map::new(),
            },
        };
        summary.updated_at = now;
        state.conversations.insert(0, summary);

        state
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, MemoryError> {
        let state = self.state.read().await;
        Ok(state.messages.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, MemoryError> {
        Ok(self.state.read().await.conversations.clone())
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<bool, MemoryError> {
        let mut state = self.state.write().await;
        let before = state.conversations.len();
        state.conversations.retain(|c| &c.id != conversation_id);
        let had_messages = state.messages.remove(conversation_id).is_some();
        Ok(had_messages || state.conversations.len() < before)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        state.conversations.clear();
        state.messages.clear();
        Ok(())
    }
}
