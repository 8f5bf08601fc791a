//! Conversation memory for Quill.
//!
//! [`MemoryManager`] composes a [`ShortTermMemory`] window with an optional
//! durable [`ConversationStore`](quill_core::ConversationStore):
//! [`SqliteStore`] on disk or [`InMemoryStore`] for tests and throwaway sessions.

pub mod in_memory;
pub mod manager;
pub mod short_term;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use manager::MemoryManager;
pub use short_term::ShortTermMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
