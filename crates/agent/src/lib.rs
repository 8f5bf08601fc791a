//! The quill agent: one conversation loop over a chat-completion provider.
//!
//! A turn follows a fixed path:
//!
//! 1. **Record** the user message in memory
//! 2. **Shape** the short-term history for the selected provider
//! 3. **Call** the model, or reuse a cached response for an identical request
//! 4. **If tool calls**: run each tool, record the results, go back to step 2
//! 5. **If text**: record it and return it
//!
//! The tool branch is bounded by `execution.max_iterations`. Backend failures
//! become an apology reply instead of an error.

pub mod agent;
pub mod builder;
pub mod error;
pub mod profile;

pub use agent::{Agent, Reply, StopReason};
pub use builder::{AgentBuilder, default_system_prompt};
pub use error::AgentError;
pub use profile::{AgentProfile, ToolProfile};
