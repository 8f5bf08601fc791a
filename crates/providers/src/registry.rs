//! Provider registry, keyed by provider id.

use std::collections::HashMap;
use std::sync::Arc;

use quill_config::{AppConfig, ResolvedProvider};
use quill_core::error::ProviderError;
use quill_core::provider::Provider;
use tracing::{debug, warn};

use crate::claude::ClaudeProvider;
use crate::openai::OpenAiProvider;

/// Provider ids this crate knows how to build.
pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "claude"];

/// Maps provider ids to ready-to-use providers.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same id.
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    /// Registered ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Build the provider for a resolved configuration.
pub fn create_provider(config: &ResolvedProvider) -> Result<Arc<dyn Provider>, ProviderError> {
    match config.id.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::from_config(config)?)),
        "claude" => Ok(Arc::new(ClaudeProvider::from_config(config)?)),
        other => Err(ProviderError::Unsupported(other.to_string())),
    }
}

/// Build every supported provider the configuration mentions.
///
/// Unsupported ids are skipped with a warning; an agent that selects one
/// gets an error reply on its first turn.
pub fn build_from_config(config: &AppConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    let mut ids: Vec<&str> = config.providers.keys().map(|s| s.as_str()).collect();
    if !ids.contains(&config.default_provider.as_str()) {
        ids.push(&config.default_provider);
    }

    for id in ids {
        if !SUPPORTED_PROVIDERS.contains(&id) {
            warn!(provider = id, "Unsupported provider in configuration, skipping");
            continue;
        }
        let Some(resolved) = config.provider(id) else {
            continue;
        };
        match create_provider(&resolved) {
            Ok(provider) => {
                debug!(provider = id, model = %resolved.model, "Registered provider");
                registry.register(id, provider);
            }
            Err(e) => warn!(provider = id, error = %e, "Failed to build provider"),
        }
    }

    registry
}
