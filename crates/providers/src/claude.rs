//! Claude (Anthropic Messages API) provider.
//!
//! Differences from the OpenAI shape:
//! - `x-api-key` header authentication (not Bearer) plus `anthropic-version`
//! - system messages are lifted into the top-level `system` field
//! - no tool schema is sent; tool and function results travel as plain user
//!   text prefixed with [`TOOL_RESULT_PREFIX`]

use async_trait::async_trait;
use quill_config::ResolvedProvider;
use quill_core::error::ProviderError;
use quill_core::message::{Message, MessageToolCall, Role};
use quill_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Prefix put in front of tool output when it is replayed as a user turn.
pub const TOOL_RESULT_PREFIX: &str = "Tool result: ";

pub struct ClaudeProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ClaudeProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        // Accept bases written with or without the version segment.
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').trim_end_matches("/v1").to_string();
        Ok(Self {
            name: "claude".into(),
            base_url,
            api_key,
            client: http::build_client(timeout_secs)?,
        })
    }

    pub fn from_config(config: &ResolvedProvider) -> Result<Self, ProviderError> {
        let mut provider = Self::new(&config.api_base, config.api_key.clone(), config.timeout_secs)?;
        provider.name = config.id.clone();
        Ok(provider)
    }

    /// Split system messages from the rest.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut rest: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                _ => rest.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, rest)
    }

    fn to_api_messages(messages: &[&Message]) -> Vec<ClaudeMessage> {
        messages
            .iter()
            .filter_map(|msg| match msg.role {
                Role::User => Some(ClaudeMessage {
                    role: "user".into(),
                    content: msg.content.clone(),
                }),
                Role::Assistant => {
                    let content = if msg.content.is_empty() && msg.has_tool_calls() {
                        let names: Vec<&str> = msg.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
                        format!("Calling tools: {}", names.join(", "))
                    } else {
                        msg.content.clone()
                    };
                    Some(ClaudeMessage {
                        role: "assistant".into(),
                        content,
                    })
                }
                Role::Tool | Role::Function => Some(ClaudeMessage {
                    role: "user".into(),
                    content: format!("{TOOL_RESULT_PREFIX}{}", msg.content),
                }),
                Role::System => None,
            })
            .collect()
    }
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape_request(&self, request: &ChatRequest) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);
        let max_tokens = request.sampling.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&messages),
            "max_tokens": max_tokens,
            "temperature": request.sampling.temperature,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<serde_json::Value, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no API key for '{}' (set CLAUDE_API_KEY, ANTHROPIC_API_KEY or providers.{}.api_key)",
                self.name, self.name
            ))
        })?;

        let url = format!("{}/v1/messages", self.base_url);
        debug!(provider = %self.name, model = %body["model"], "Sending completion request");

        let request = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        http::post_json(request, body, &self.name).await
    }

    fn parse_response(&self, raw: &serde_json::Value) -> Result<ProviderResponse, ProviderError> {
        let resp: ClaudeResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse Claude response: {e}")))?;

        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in &resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(MessageToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: input.to_string(),
                    });
                }
                ResponseContentBlock::Other => {}
            }
        }

        let mut message = Message::assistant(text_content).with_tool_calls(tool_calls);
        if let Some(reason) = &resp.stop_reason {
            message = message.with_metadata("stop_reason", serde_json::json!(reason));
        }

        let usage = resp.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: resp.model,
            metadata: serde_json::Map::new(),
        })
    }
}

// --- Claude API types ---

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    model: String,
    content: Vec<ResponseContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> ClaudeProvider {
        ClaudeProvider::new(DEFAULT_BASE_URL, Some("sk-ant-test".into()), 30).unwrap()
    }

    #[test]
    fn base_url_drops_version_suffix() {
        let p = ClaudeProvider::new("https://api.anthropic.com/v1/", None, 30).unwrap();
        assert_eq!(p.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn system_messages_are_lifted() {
        let request = ChatRequest::new(
            "claude-3-opus-20240229",
            vec![Message::system("be brief"), Message::user("hi"), Message::assistant("hello")],
        );
        let body = provider().shape_request(&request);

        assert_eq!(body["system"], "be brief");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn tool_results_become_prefixed_user_text() {
        let request = ChatRequest::new(
            "claude-3-opus-20240229",
            vec![
                Message::user("what is 6*7?"),
                Message::assistant("").with_tool_calls(vec![MessageToolCall::new("c1", "calculator", "{}")]),
                Message::tool_result("c1", "42"),
                Message::new(Role::Function, "sunny").with_name("get_weather"),
            ],
        );
        let body = provider().shape_request(&request);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages[1]["content"], "Calling tools: calculator");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"], "Tool result: 42");
        assert_eq!(messages[3]["content"], "Tool result: sunny");
    }

    #[test]
    fn tools_are_never_sent() {
        let def = ToolDefinition {
            name: "echo".into(),
            description: "Echo".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        };
        let request = ChatRequest::new("claude-3-opus-20240229", vec![Message::user("hi")]).with_tools(vec![def]);
        let body = provider().shape_request(&request);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn parse_text_response() {
        let raw = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-opus-20240229",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": "there"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 3}
        });
        let response = provider().parse_response(&raw).unwrap();
        assert_eq!(response.message.content, "Hello\nthere");
        assert_eq!(response.message.role, Role::Assistant);
        assert_eq!(response.message.metadata["stop_reason"], "end_turn");
        assert_eq!(response.usage.unwrap().total_tokens, 13);
    }

    #[test]
    fn parse_tool_use_and_unknown_blocks() {
        let raw = json!({
            "model": "claude-3-opus-20240229",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "tool_use", "id": "toolu_1", "name": "echo", "input": {"x": "42"}}
            ]
        });
        let response = provider().parse_response(&raw).unwrap();
        assert_eq!(response.message.content, "");
        assert_eq!(response.message.tool_calls.len(), 1);
        assert_eq!(response.message.tool_calls[0].arguments, r#"{"x":"42"}"#);
    }

    #[test]
    fn parse_rejects_error_payload() {
        let raw = json!({"type": "error", "error": {"type": "overloaded_error"}});
        let err = provider().parse_response(&raw).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
