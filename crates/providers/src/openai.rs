//! OpenAI chat-completions provider.
//!
//! Keeps the message list as-is, sends tools natively as `function` tools,
//! and reads tool calls back from `choices[0].message.tool_calls`.

use async_trait::async_trait;
use quill_config::ResolvedProvider;
use quill_core::error::ProviderError;
use quill_core::message::{Message, MessageToolCall, Role};
use quill_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: "openai".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: http::build_client(timeout_secs)?,
        })
    }

    pub fn from_config(config: &ResolvedProvider) -> Result<Self, ProviderError> {
        let mut provider = Self::new(&config.api_base, config.api_key.clone(), config.timeout_secs)?;
        provider.name = config.id.clone();
        Ok(provider)
    }

    /// Tool outputs at the head of a truncated window have lost the assistant
    /// message that requested them, and the API rejects them.
    fn drop_orphan_tool_outputs(messages: &[Message]) -> &[Message] {
        let start = messages.iter().take_while(|m| m.role.is_tool_output()).count();
        if start > 0 {
            debug!(dropped = start, "Dropping tool outputs without a preceding tool call");
        }
        &messages[start..]
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        Self::drop_orphan_tool_outputs(messages)
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
                name: m.name.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape_request(&self, request: &ChatRequest) -> serde_json::Value {
        let sampling = &request.sampling;
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": sampling.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = sampling.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = sampling.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(penalty) = sampling.frequency_penalty {
            body["frequency_penalty"] = serde_json::json!(penalty);
        }
        if let Some(penalty) = sampling.presence_penalty {
            body["presence_penalty"] = serde_json::json!(penalty);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            if let Some(choice) = request.tool_choice {
                body["tool_choice"] = serde_json::json!(choice.as_str());
            }
        }

        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<serde_json::Value, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no API key for '{}' (set {}_API_KEY or providers.{}.api_key)",
                self.name,
                self.name.to_uppercase(),
                self.name
            ))
        })?;

        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %body["model"], "Sending completion request");

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"));
        http::post_json(request, body, &self.name).await
    }

    fn parse_response(&self, raw: &serde_json::Value) -> Result<ProviderResponse, ProviderError> {
        let api_response: ApiResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let mut message = Message::new(Role::Assistant, choice.message.content.unwrap_or_default())
            .with_tool_calls(tool_calls);
        if let Some(reason) = choice.finish_reason {
            message = message.with_metadata("finish_reason", serde_json::json!(reason));
        }

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model,
            metadata: serde_json::Map::new(),
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(DEFAULT_BASE_URL, Some("sk-test".into()), 30).unwrap()
    }

    fn echo_definition() -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "Echo text".into(),
            parameters: json!({"type": "object", "properties": {"x": {"type": "string"}}, "required": ["x"]}),
        }
    }

    #[test]
    fn shape_keeps_roles_and_tool_calls() {
        let messages = vec![
            Message::system("rules"),
            Message::user("hi"),
            Message::assistant("").with_tool_calls(vec![MessageToolCall::new("c1", "echo", r#"{"x":"42"}"#)]),
            Message::tool_result("c1", "42"),
        ];
        let request = ChatRequest::new("gpt-4o", messages).with_sampling(SamplingParams {
            temperature: 0.2,
            max_tokens: Some(100),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.5),
        });
        let body = provider().shape_request(&request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["top_p"], 1.0);
        assert_eq!(body["presence_penalty"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["tool_calls"][0]["id"], "c1");
        assert_eq!(body["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["arguments"], r#"{"x":"42"}"#);
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "c1");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn shape_includes_tools_and_auto_choice() {
        let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]).with_tools(vec![echo_definition()]);
        let body = provider().shape_request(&request);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "echo");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"][0], "x");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn shape_is_deterministic() {
        let request = ChatRequest::new("gpt-4o", vec![Message::user("same")]);
        let p = provider();
        assert_eq!(p.shape_request(&request), p.shape_request(&request));
    }

    #[test]
    fn function_messages_carry_name() {
        let request = ChatRequest::new(
            "gpt-4o",
            vec![
                Message::user("weather?"),
                Message::new(Role::Function, "sunny").with_name("get_weather"),
            ],
        );
        let body = provider().shape_request(&request);
        assert_eq!(body["messages"][1]["role"], "function");
        assert_eq!(body["messages"][1]["name"], "get_weather");
    }

    #[test]
    fn truncated_window_drops_leading_tool_outputs() {
        let request = ChatRequest::new(
            "gpt-4o",
            vec![
                Message::tool_result("c1", "42"),
                Message::new(Role::Function, "sunny").with_name("get_weather"),
                Message::assistant("It is 42 and sunny."),
                Message::user("thanks"),
                Message::assistant("").with_tool_calls(vec![MessageToolCall::new("c2", "echo", "{}")]),
                Message::tool_result("c2", "ok"),
            ],
        );
        let body = provider().shape_request(&request);
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["assistant", "user", "assistant", "tool"]);
        assert_eq!(body["messages"][3]["tool_call_id"], "c2");
    }

    #[test]
    fn parse_text_response() {
        let raw = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        });
        let response = provider().parse_response(&raw).unwrap();
        assert_eq!(response.message.role, Role::Assistant);
        assert_eq!(response.message.content, "hello");
        assert!(response.message.tool_calls.is_empty());
        assert_eq!(response.model, "gpt-4o-2024-08-06");
        assert_eq!(response.usage.unwrap().total_tokens, 6);
    }

    #[test]
    fn parse_tool_call_response() {
        let raw = json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "echo", "arguments": "{\"x\":\"1\"}"}},
                        {"id": "call_b", "type": "function", "function": {"name": "calculator", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let response = provider().parse_response(&raw).unwrap();
        assert_eq!(response.message.content, "");
        assert_eq!(response.message.tool_calls.len(), 2);
        assert_eq!(response.message.tool_calls[0].id, "call_a");
        assert_eq!(response.message.tool_calls[1].name, "calculator");
    }

    #[test]
    fn parse_rejects_empty_choices() {
        let err = provider().parse_response(&json!({"model": "gpt-4o", "choices": []})).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));

        let err = provider().parse_response(&json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn send_without_key_is_not_configured() {
        let p = OpenAiProvider::new(DEFAULT_BASE_URL, None, 5).unwrap();
        let err = p.send(&json!({"model": "gpt-4o"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
