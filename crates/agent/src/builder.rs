//! Agent construction.

use std::sync::Arc;

use chrono::{Local, Utc};
use quill_cache::ResponseCache;
use quill_config::AppConfig;
use quill_core::error::ProviderError;
use quill_core::memory::ConversationStore;
use quill_core::message::ConversationId;
use quill_core::provider::{Provider, SamplingParams};
use quill_core::tool::{Tool, ToolRegistry};
use quill_memory::MemoryManager;
use quill_providers::{ProviderRegistry, create_provider};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::error::AgentError;

/// Builder for [`Agent`].
///
/// Everything not set explicitly falls back to the shared [`AppConfig`].
pub struct AgentBuilder {
    name: String,
    config: Arc<AppConfig>,
    description: Option<String>,
    provider_id: Option<String>,
    system_prompt: Option<String>,
    tools: ToolRegistry,
    memory_capacity: Option<usize>,
    long_term: Option<bool>,
    cache: Option<bool>,
    max_iterations: Option<usize>,
    backend: Option<Arc<dyn Provider>>,
    registry: Option<ProviderRegistry>,
    store: Option<Arc<dyn ConversationStore>>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, config: Arc<AppConfig>) -> Self {
        Self {
            name: name.into(),
            config,
            description: None,
            provider_id: None,
            system_prompt: None,
            tools: ToolRegistry::new(),
            memory_capacity: None,
            long_term: None,
            cache: None,
            max_iterations: None,
            backend: None,
            registry: None,
            store: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Select a provider id from the configuration (`openai`, `claude`).
    pub fn with_provider(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Box<dyn Tool>>) -> Self {
        for tool in tools {
            self.tools.register(tool);
        }
        self
    }

    /// Replace the tool set with a prepared registry.
    pub fn with_tool_registry(mut self, registry: ToolRegistry) -> Self {
        self.tools = registry;
        self
    }

    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = Some(capacity);
        self
    }

    pub fn with_long_term(mut self, enabled: bool) -> Self {
        self.long_term = Some(enabled);
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// Use this provider instead of building one from the configuration.
    pub fn with_backend(mut self, provider: Arc<dyn Provider>) -> Self {
        self.backend = Some(provider);
        self
    }

    /// Look the provider id up in `registry` instead of building it.
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this store for long-term memory instead of the configured SQLite file.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> Result<Agent, AgentError> {
        let config = self.config;
        config.validate()?;

        let provider_id = self.provider_id.unwrap_or_else(|| config.default_provider.clone());
        let resolved = config.provider(&provider_id);
        let (model, sampling) = match &resolved {
            Some(r) => (r.model.clone(), r.sampling.clone()),
            None => (String::new(), SamplingParams::default()),
        };

        let provider = match (self.backend, &self.registry) {
            (Some(provider), _) => Ok(provider),
            (None, Some(registry)) => registry
                .get(&provider_id)
                .ok_or_else(|| ProviderError::Unsupported(provider_id.clone())),
            (None, None) => match &resolved {
                Some(r) => create_provider(r),
                None => Err(ProviderError::Unsupported(provider_id.clone())),
            },
        };
        if let Err(e) = &provider {
            warn!(provider = %provider_id, error = %e, "Provider unavailable, turns will report the error");
        }

        let capacity = self.memory_capacity.unwrap_or(config.memory.short_term_capacity);
        let long_term = self.long_term.unwrap_or(config.memory.long_term_enabled);
        let store = if long_term {
            match self.store {
                Some(store) => Some(store),
                None => open_store(&config).await,
            }
        } else {
            None
        };
        let memory = match store {
            Some(store) => MemoryManager::with_store(capacity, store),
            None => MemoryManager::new(capacity),
        };

        let cache = self
            .cache
            .unwrap_or(config.cache.enabled)
            .then(|| ResponseCache::new(&config.cache.directory, config.cache.expiry_days));

        let description = self.description.unwrap_or_else(|| format!("{} agent", self.name));
        let system_prompt = self
            .system_prompt
            .unwrap_or_else(|| default_system_prompt(&self.name, &description));
        let max_iterations = self.max_iterations.unwrap_or(config.execution.max_iterations);

        let mut agent = Agent {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            description,
            provider_id,
            model,
            sampling,
            provider,
            system_prompt,
            tools: self.tools,
            memory,
            cache,
            max_iterations,
            conversation_id: ConversationId::new(),
            created_at: Utc::now(),
            config,
        };
        agent.bind_fresh_conversation().await;

        info!(
            agent = %agent.name,
            provider = %agent.provider_id,
            model = %agent.model,
            tools = agent.tools.len(),
            long_term = agent.memory.long_term_enabled(),
            cache = agent.cache.is_some(),
            "Agent created"
        );
        Ok(agent)
    }
}

async fn open_store(config: &AppConfig) -> Option<Arc<dyn ConversationStore>> {
    let path = &config.memory.long_term_db_path;
    match quill_memory::SqliteStore::open(path).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Long-term memory unavailable, using short-term only");
            None
        }
    }
}

/// System prompt used when none is given.
pub fn default_system_prompt(name: &str, description: &str) -> String {
    format!(
        "You are an assistant named {name}.\n{description}\n\n\
         Current time: {}\n\n\
         Be as helpful, safe and honest as you can. If you do not know the answer \
         to a question, say so plainly instead of making something up.",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}
