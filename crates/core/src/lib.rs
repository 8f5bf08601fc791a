//! # Quill Core
//!
//! Domain types, traits, and error definitions shared by every Quill crate.
//!
//! Each subsystem boundary is a trait defined here:
//! - [`Provider`] for chat-completion backends
//! - [`Tool`] for callables the model may invoke
//! - [`ConversationStore`] for the durable message log
//!
//! Implementations live in their own crates, so tests can swap in mocks.

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{MemoryError, ProviderError, ToolError};
pub use memory::{ConversationStore, ConversationSummary};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use provider::{ChatRequest, Provider, ProviderResponse, SamplingParams, ToolChoice, ToolDefinition, Usage};
pub use tool::{ParamType, Tool, ToolCall, ToolParameter, ToolRegistry, ToolResult};
