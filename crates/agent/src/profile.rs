//! Serializable snapshot of an agent.

use chrono::{DateTime, Utc};
use quill_core::message::ConversationId;
use quill_core::tool::{Tool, ToolParameter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub provider: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub conversation_id: ConversationId,
    pub system_prompt: String,
    pub tools: Vec<ToolProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProfile {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
    pub return_direct: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolProfile {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters().to_vec(),
            return_direct: tool.return_direct(),
            metadata: tool.metadata(),
        }
    }
}
