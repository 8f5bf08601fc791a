//! The agent run loop: model call, tool dispatch, memory persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quill_cache::ResponseCache;
use quill_config::AppConfig;
use quill_core::error::{ProviderError, ToolError};
use quill_core::memory::ConversationSummary;
use quill_core::message::{ConversationId, Message, MessageToolCall};
use quill_core::provider::{ChatRequest, Provider, SamplingParams};
use quill_core::tool::{Tool, ToolCall, ToolRegistry};
use quill_memory::MemoryManager;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::profile::{AgentProfile, ToolProfile};

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting tools.
    Completed,
    /// The backend call failed; the reply is an apology carrying the error.
    BackendError,
    /// The model kept requesting tools past the iteration limit.
    ToolLoopExceeded,
    /// Every tool in the last round was a `return_direct` tool.
    ReturnDirect,
}

/// The outcome of one conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    pub stop: StopReason,
    /// Long-term memory writes that failed during this turn.
    pub persist_failures: usize,
}

struct ToolOutcome {
    content: String,
    direct: bool,
}

/// A conversational agent bound to one provider and one conversation at a time.
///
/// Built with [`crate::AgentBuilder`].
pub struct Agent {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) provider_id: String,
    pub(crate) model: String,
    pub(crate) sampling: SamplingParams,
    pub(crate) provider: Result<Arc<dyn Provider>, ProviderError>,
    pub(crate) system_prompt: String,
    pub(crate) tools: ToolRegistry,
    pub(crate) memory: MemoryManager,
    pub(crate) cache: Option<ResponseCache>,
    pub(crate) max_iterations: usize,
    pub(crate) conversation_id: ConversationId,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) config: Arc<AppConfig>,
}

impl Agent {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Short-term history, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.memory.messages()
    }

    /// Run one turn and return the reply text.
    ///
    /// Never fails: backend and tool errors are turned into reply text.
    pub async fn run(&mut self, input: &str) -> String {
        self.respond(input).await.text
    }

    /// Run one turn and report how it ended.
    pub async fn respond(&mut self, input: &str) -> Reply {
        let failures_before = self.memory.persist_failures();
        info!(
            agent = %self.name,
            conversation_id = %self.conversation_id,
            "Processing user message"
        );

        self.memory.add(Message::user(input)).await;
        let (text, stop) = self.drive().await;

        Reply {
            text,
            stop,
            persist_failures: self.memory.persist_failures().saturating_sub(failures_before),
        }
    }

    async fn drive(&mut self) -> (String, StopReason) {
        let mut rounds = 0;
        loop {
            let response = match self.call_model().await {
                Ok(message) => message,
                Err(e) => {
                    error!(provider = %self.provider_id, error = %e, "Model call failed");
                    return self
                        .finish(format!("Sorry, I ran into an error: {e}"), StopReason::BackendError)
                        .await;
                }
            };

            if !response.has_tool_calls() {
                let text = response.content.clone();
                self.memory.add(response).await;
                return (text, StopReason::Completed);
            }

            if rounds >= self.max_iterations {
                warn!(
                    conversation_id = %self.conversation_id,
                    rounds,
                    "Tool iteration limit reached"
                );
                return self
                    .finish(
                        format!("Stopped after {rounds} tool iterations without a final answer."),
                        StopReason::ToolLoopExceeded,
                    )
                    .await;
            }
            rounds += 1;

            let calls = response.tool_calls.clone();
            debug!(round = rounds, tool_calls = calls.len(), "Dispatching tool calls");
            self.memory.add(response).await;

            let mut direct_outputs = Vec::new();
            let mut all_direct = true;
            for call in &calls {
                let outcome = self.dispatch(call).await;
                if outcome.direct {
                    direct_outputs.push(outcome.content.clone());
                } else {
                    all_direct = false;
                }
                self.memory.add(Message::tool_result(&call.id, outcome.content)).await;
            }

            if all_direct && !direct_outputs.is_empty() {
                debug!(conversation_id = %self.conversation_id, "Returning tool output directly");
                return self.finish(direct_outputs.join("\n"), StopReason::ReturnDirect).await;
            }
        }
    }

    async fn finish(&mut self, text: String, stop: StopReason) -> (String, StopReason) {
        self.memory.add(Message::assistant(text.clone())).await;
        (text, stop)
    }

    /// Shape the current history, consult the cache, and call the backend on a miss.
    async fn call_model(&self) -> Result<Message, ProviderError> {
        let provider = self.provider.as_ref().map_err(|e| e.clone())?;

        let request = ChatRequest::new(&self.model, self.memory.messages())
            .with_sampling(self.sampling.clone())
            .with_tools(self.tools.definitions());
        let body = provider.shape_request(&request);
        let cache_request = json!({ "provider": provider.name(), "body": body });

        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(&cache_request) {
                match provider.parse_response(&raw) {
                    Ok(response) => {
                        info!(provider = %provider.name(), "Using cached response");
                        return Ok(response.message);
                    }
                    Err(e) => warn!(error = %e, "Cached response unreadable, calling provider"),
                }
            }
        }

        let raw = provider.send(&body).await?;
        let response = provider.parse_response(&raw)?;
        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Model call completed"
            );
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&cache_request, &raw) {
                warn!(error = %e, "Failed to write response cache");
            }
        }
        Ok(response.message)
    }

    /// Run one tool call. Every failure becomes the text of the tool message.
    async fn dispatch(&self, call: &MessageToolCall) -> ToolOutcome {
        let arguments = if call.arguments.trim().is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(&call.arguments)
        };
        let arguments = match arguments {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Undecodable tool arguments");
                return ToolOutcome {
                    content: format!("Invalid arguments for tool '{}': {e}", call.name),
                    direct: false,
                };
            }
        };

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };
        debug!(tool = %call.name, call_id = %call.id, "Executing tool");

        match self.tools.execute(&tool_call).await {
            Ok(result) => ToolOutcome {
                content: result.output,
                direct: result.return_direct,
            },
            Err(ToolError::NotFound(name)) => {
                warn!(tool = %name, "Model requested an unknown tool");
                ToolOutcome {
                    content: format!("Tool not found: {name}"),
                    direct: false,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolOutcome {
                    content: format!("Tool execution failed: {e}"),
                    direct: false,
                }
            }
        }
    }

    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.register(tool);
    }

    pub fn add_tools(&mut self, tools: impl IntoIterator<Item = Box<dyn Tool>>) {
        for tool in tools {
            self.tools.register(tool);
        }
    }

    /// Drop the short-term history and start over from the system prompt.
    pub async fn clear_memory(&mut self) {
        self.memory.clear_short_term();
        self.memory.add(Message::system(self.system_prompt.clone())).await;
        info!(conversation_id = %self.conversation_id, "Cleared short-term memory");
    }

    /// Start a fresh conversation and return its id.
    pub async fn new_conversation(&mut self) -> ConversationId {
        self.bind_fresh_conversation().await;
        info!(conversation_id = %self.conversation_id, "Started new conversation");
        self.conversation_id.clone()
    }

    pub(crate) async fn bind_fresh_conversation(&mut self) {
        let id = ConversationId::new();
        self.memory.set_conversation(id.clone()).await;
        self.conversation_id = id;
        self.memory.add(Message::system(self.system_prompt.clone())).await;
    }

    /// Continue a stored conversation.
    ///
    /// Returns false, leaving the current conversation in place, when
    /// long-term memory is off or nothing is stored under `id`.
    pub async fn load_conversation(&mut self, id: &ConversationId) -> bool {
        if !self.memory.long_term_enabled() {
            warn!(conversation_id = %id, "Cannot load a conversation without long-term memory");
            return false;
        }
        if self.memory.history(id).await.is_empty() {
            warn!(conversation_id = %id, "No stored conversation with this id");
            return false;
        }

        let replayed = self.memory.set_conversation(id.clone()).await;
        self.conversation_id = id.clone();
        info!(conversation_id = %id, messages = replayed, "Loaded conversation");
        true
    }

    /// Stored conversations, most recently updated first.
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.memory.conversations().await
    }

    pub async fn delete_conversation(&self, id: &ConversationId) -> bool {
        self.memory.delete_conversation(id).await
    }

    pub fn profile(&self) -> AgentProfile {
        AgentProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            provider: self.provider_id.clone(),
            model: self.model.clone(),
            created_at: self.created_at,
            conversation_id: self.conversation_id.clone(),
            system_prompt: self.system_prompt.clone(),
            tools: self.tools.iter().map(ToolProfile::from_tool).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.profile())
    }
}
