//! Closure-backed tools.
//!
//! [`FunctionTool`] turns a plain function into a [`Tool`] with an explicit
//! parameter list:
//!
//! ```
//! use quill_core::tool::{ParamType, ToolParameter};
//! use quill_tools::FunctionTool;
//! use serde_json::json;
//!
//! let echo = FunctionTool::new("echo", "Repeat the input", |args| Ok(args["x"].clone()))
//!     .param(ToolParameter::required("x", ParamType::String, "Text to repeat"));
//! ```

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolParameter};
use serde_json::{Map, Value};

type Handler = dyn Fn(Map<String, Value>) -> Result<Value, String> + Send + Sync;

pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    return_direct: bool,
    metadata: Map<String, Value>,
    handler: Box<Handler>,
}

impl FunctionTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            return_direct: false,
            metadata: Map::new(),
            handler: Box::new(handler),
        }
    }

    /// Declare the next parameter.
    pub fn param(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// End the turn with this tool's output instead of returning to the model.
    pub fn with_return_direct(mut self, return_direct: bool) -> Self {
        self.return_direct = return_direct;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    fn return_direct(&self) -> bool {
        self.return_direct
    }

    fn metadata(&self) -> Map<String, Value> {
        self.metadata.clone()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        (self.handler)(arguments).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::tool::{ParamType, ToolCall, ToolRegistry};
    use serde_json::json;

    fn greet() -> FunctionTool {
        FunctionTool::new("greet", "Greet someone", |args| {
            let name = args["name"].as_str().unwrap_or_default();
            let greeting = args["greeting"].as_str().unwrap_or_default();
            Ok(json!(format!("{greeting}, {name}!")))
        })
        .param(ToolParameter::required("name", ParamType::String, "Who to greet"))
        .param(ToolParameter::optional("greeting", ParamType::String, "Greeting word").with_default(json!("Hello")))
        .with_metadata("category", json!("demo"))
    }

    #[test]
    fn schema_follows_declaration() {
        let tool = greet();
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], json!(["name"]));
        assert_eq!(schema["properties"]["greeting"]["default"], "Hello");
        assert_eq!(tool.metadata()["category"], "demo");
        assert!(!tool.return_direct());
    }

    #[tokio::test]
    async fn defaults_are_filled_through_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(greet()));
        let call = ToolCall {
            id: "c1".into(),
            name: "greet".into(),
            arguments: json!({"name": "Ada"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.output, "Hello, Ada!");
    }

    #[tokio::test]
    async fn non_string_results_are_serialized() {
        let tool = FunctionTool::new("sum", "Add numbers", |args| {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok(json!({"sum": a + b}))
        });
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(tool));
        let call = ToolCall {
            id: "c2".into(),
            name: "sum".into(),
            arguments: json!({"a": 1, "b": 2}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.output, r#"{"sum":3.0}"#);
        assert_eq!(result.data, Some(json!({"sum": 3.0})));
    }

    #[tokio::test]
    async fn handler_errors_become_execution_failures() {
        let tool = FunctionTool::new("boom", "Always fails", |_| Err("exploded".into()));
        let err = tool.execute(Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom: exploded");
    }
}
