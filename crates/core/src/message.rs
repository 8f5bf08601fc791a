//! Message domain types.
//!
//! A [`Message`] is one turn of a conversation. Messages flow from the user
//! into memory, out to a provider, and back as assistant or tool turns.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    #[default]
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
    /// Legacy function-call result
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
            Role::Function => "function",
        }
    }

    /// Parse a stored role name. Unknown names fall back to [`Role::User`].
    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            "function" => Role::Function,
            _ => Role::User,
        }
    }

    /// Tool and function turns both carry the output of an invocation.
    pub fn is_tool_output(&self) -> bool {
        matches!(self, Role::Tool | Role::Function)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// A single message in a conversation.
///
/// Every field has a serde default, so a partial JSON object (for example a
/// row written by an older version) still deserializes: the role falls back
/// to `user`, content to empty, and the timestamp to the time of decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    #[serde(default = "new_message_id")]
    pub id: String,

    /// Who sent this message
    #[serde(default)]
    pub role: Role,

    /// The text content
    #[serde(default)]
    pub content: String,

    /// Optional sender name (function name for function turns)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Create a message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Dictionary form of this message.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Rebuild a message from its dictionary form, filling in missing fields.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Parse an RFC 3339 timestamp, or a zone-less ISO-8601 one read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(Utc::now()),
        Some(raw) => parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON text, exactly as the model produced them
    #[serde(default)]
    pub arguments: String,
}

impl MessageToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert!(msg.tool_call_id.is_none());
    }

    #[test]
    fn tool_result_links_call_id() {
        let msg = Message::tool_result("call_7", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_7"));
    }

    #[test]
    fn dictionary_round_trip_preserves_fields() {
        let msg = Message::assistant("")
            .with_tool_calls(vec![MessageToolCall::new("c1", "echo", r#"{"x":"42"}"#)])
            .with_metadata("provider", json!("openai"));

        let back = Message::from_value(msg.to_value()).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.content, "");
        assert_eq!(back.tool_calls, msg.tool_calls);
        assert_eq!(back.timestamp, msg.timestamp);
        assert_eq!(back.metadata["provider"], "openai");

        let tool = Message::tool_result("c1", "42");
        let back = Message::from_value(tool.to_value()).unwrap();
        assert_eq!(back.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(back.role, Role::Tool);
    }

    #[test]
    fn from_value_fills_missing_fields() {
        let before = Utc::now();
        let msg = Message::from_value(json!({})).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "");
        assert!(msg.tool_calls.is_empty());
        assert!(msg.metadata.is_empty());
        assert!(!msg.id.is_empty());
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn from_value_keeps_given_timestamp() {
        let msg = Message::from_value(json!({
            "role": "system",
            "content": "rules",
            "timestamp": "2024-03-01T12:30:00Z"
        }))
        .unwrap();
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn zone_less_timestamp_is_read_as_utc() {
        let msg = Message::from_value(json!({
            "role": "user",
            "content": "hi",
            "timestamp": "2024-03-01T12:30:00.123456"
        }))
        .unwrap();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-03-01T12:30:00.123456+00:00");

        let back = Message::from_value(msg.to_value()).unwrap();
        assert_eq!(back.timestamp, msg.timestamp);

        assert!(parse_timestamp("2024-03-01 12:30:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(Message::from_value(json!({"timestamp": "yesterday"})).is_err());
        assert!(Message::from_value(json!({"timestamp": null})).is_ok());
    }

    #[test]
    fn role_parse_falls_back_to_user() {
        assert_eq!(Role::parse("function"), Role::Function);
        assert_eq!(Role::parse("assistant"), Role::Assistant);
        assert_eq!(Role::parse("narrator"), Role::User);
        assert!(Role::Function.is_tool_output());
    }
}
