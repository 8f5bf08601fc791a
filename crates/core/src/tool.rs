//! Tool trait and the declarative parameter model.
//!
//! A tool declares its parameters as a list of [`ToolParameter`]s. The JSON
//! Schema sent to a provider is derived from that list, and the same list is
//! used to validate and complete the arguments a model produces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// JSON type tag of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_required")]
    pub required: bool,

    /// Value filled in when an optional parameter is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_required() -> bool {
    true
}

impl ToolParameter {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Make the parameter optional with a fallback value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }
}

/// Build the `{type: object, properties, required}` schema for a parameter list.
pub fn parameters_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for p in parameters {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(p.param_type.as_str()));
        if !p.description.is_empty() {
            prop.insert("description".into(), json!(p.description));
        }
        if let Some(default) = &p.default {
            prop.insert("default".into(), default.clone());
        }
        properties.insert(p.name.clone(), Value::Object(prop));
        if p.required {
            required.push(json!(p.name));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Check `arguments` against the declaration and fill in defaults.
///
/// `null` counts as an empty object. Undeclared keys are passed through.
pub fn bind_arguments(parameters: &[ToolParameter], arguments: Value) -> Result<Map<String, Value>, ToolError> {
    let mut args = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "expected a JSON object, got {other}"
            )));
        }
    };
    for p in parameters {
        if args.contains_key(&p.name) {
            continue;
        }
        if let Some(default) = &p.default {
            args.insert(p.name.clone(), default.clone());
        } else if p.required {
            return Err(ToolError::InvalidArguments(format!(
                "missing required parameter '{}'",
                p.name
            )));
        }
    }
    Ok(args)
}

/// Render a tool's return value as message text.
pub fn output_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    pub name: String,

    /// Decoded arguments
    pub arguments: Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The output rendered as text
    pub output: String,

    /// The raw return value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Whether the tool asked to end the turn with this output
    #[serde(default)]
    pub return_direct: bool,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name the model uses to call this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Declared parameters, in order.
    fn parameters(&self) -> &[ToolParameter];

    /// When true, a successful call ends the turn with the tool output
    /// instead of going back to the model.
    fn return_direct(&self) -> bool {
        false
    }

    fn metadata(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Execute the tool with arguments already bound by [`bind_arguments`].
    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;

    fn parameters_schema(&self) -> Value {
        parameters_schema(self.parameters())
    }

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tools available to an agent, in registration order.
///
/// Names are not deduplicated; lookups return the first registered match.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Look up, bind arguments for, and run a tool call.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let args = bind_arguments(tool.parameters(), call.arguments.clone())?;
        let value = tool.execute(args).await?;
        Ok(ToolResult {
            call_id: call.id.clone(),
            output: output_text(&value),
            data: (!value.is_string()).then_some(value),
            return_direct: tool.return_direct(),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
