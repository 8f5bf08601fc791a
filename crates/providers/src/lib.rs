//! Chat-completion providers for Quill.
//!
//! All providers implement the `quill_core::Provider` trait. The registry
//! builds them from configuration and looks them up by id.

mod http;

pub mod claude;
pub mod openai;
pub mod registry;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;
pub use registry::{ProviderRegistry, SUPPORTED_PROVIDERS, build_from_config, create_provider};
