//! Two-tier memory: a short-term window composed with an optional durable log.
//!
//! Durable writes are best-effort. A failed write is logged and counted but
//! never returned, so the short-term window can hold turns the log is missing.
//! [`MemoryManager::persist_failures`] exposes the count.

use crate::short_term::ShortTermMemory;
use quill_core::memory::{ConversationStore, ConversationSummary};
use quill_core::message::{ConversationId, Message};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

pub struct MemoryManager {
    short_term: ShortTermMemory,
    store: Option<Arc<dyn ConversationStore>>,
    conversation_id: Option<ConversationId>,
    persist_failures: AtomicUsize,
}

impl MemoryManager {
    /// Short-term memory only.
    pub fn new(capacity: usize) -> Self {
        Self {
            short_term: ShortTermMemory::new(capacity),
            store: None,
            conversation_id: None,
            persist_failures: AtomicUsize::new(0),
        }
    }

    /// Short-term memory backed by a durable store.
    pub fn with_store(capacity: usize, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(capacity)
        }
    }

    pub fn long_term_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.short_term.capacity()
    }

    /// Number of durable-store operations that failed and were swallowed.
    pub fn persist_failures(&self) -> usize {
        self.persist_failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self, operation: &str, error: &dyn std::fmt::Display) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
        warn!(operation, error = %error, "Long-term memory operation failed");
    }

    /// Record a turn. The durable log is written only when long-term memory is
    /// enabled and a conversation is bound.
    pub async fn add(&mut self, message: Message) {
        if let (Some(store), Some(id)) = (&self.store, &self.conversation_id) {
            if let Err(e) = store.append(id, &message).await {
                self.record_failure("append", &e);
            }
        }
        self.short_term.add(message);
    }

    /// The short-term window, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.short_term.all()
    }

    pub fn clear_short_term(&mut self) {
        self.short_term.clear();
    }

    /// Bind to `id`, clear the window, and replay the durable log into it.
    ///
    /// Only the last `capacity` messages survive the replay. Returns the
    /// number of messages read from the log.
    pub async fn set_conversation(&mut self, id: ConversationId) -> usize {
        self.short_term.clear();
        let history = self.history(&id).await;
        let count = history.len();
        for message in history {
            self.short_term.add(message);
        }
        debug!(conversation_id = %id, replayed = count, "Bound memory to conversation");
        self.conversation_id = Some(id);
        count
    }

    /// Full durable log of a conversation. Empty when long-term memory is off.
    pub async fn history(&self, id: &ConversationId) -> Vec<Message> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.load(id).await {
            Ok(messages) => messages,
            Err(e) => {
                self.record_failure("load", &e);
                Vec::new()
            }
        }
    }

    /// Stored conversations, most recently updated first.
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        store.list().await.unwrap_or_else(|e| {
            self.record_failure("list", &e);
            Vec::new()
        })
    }

    /// Delete a stored conversation. Returns whether anything was removed.
    pub async fn delete_conversation(&self, id: &ConversationId) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.delete(id).await {
            Ok(deleted) => {
                if deleted {
                    info!(conversation_id = %id, "Deleted conversation");
                }
                deleted
            }
            Err(e) => {
                self.record_failure("delete", &e);
                false
            }
        }
    }

    /// Wipe the durable log and the short-term window.
    pub async fn clear_all(&mut self) -> bool {
        self.short_term.clear();
        let Some(store) = &self.store else {
            return true;
        };
        match store.clear().await {
            Ok(()) => true,
            Err(e) => {
                self.record_failure("clear", &e);
                false
            }
        }
    }
}
