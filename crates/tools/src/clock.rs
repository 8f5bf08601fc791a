//! Current local time.

use async_trait::async_trait;
use chrono::Local;
use quill_core::error::ToolError;
use quill_core::tool::{ParamType, Tool, ToolParameter};
use serde_json::{Map, Value, json};
use std::fmt::Write;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CurrentTimeTool {
    parameters: Vec<ToolParameter>,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self {
            parameters: vec![
                ToolParameter::optional("format", ParamType::String, "strftime-style format string")
                    .with_default(json!(DEFAULT_TIME_FORMAT)),
            ],
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date and time."
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let format = arguments
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TIME_FORMAT);

        // chrono reports bad format strings through fmt::Error instead of panicking
        // only when written with `write!`.
        let mut out = String::new();
        write!(out, "{}", Local::now().format(format))
            .map_err(|_| ToolError::InvalidArguments(format!("invalid time format '{format}'")))?;
        Ok(json!(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_format_has_date_and_time() {
        let tool = CurrentTimeTool::new();
        let mut args = Map::new();
        args.insert("format".into(), json!(DEFAULT_TIME_FORMAT));
        let value = tool.execute(args).await.unwrap();
        let text = value.as_str().unwrap();
        assert_eq!(text.len(), "2024-01-01 00:00:00".len());
        assert!(chrono::NaiveDateTime::parse_from_str(text, DEFAULT_TIME_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn custom_format() {
        let tool = CurrentTimeTool::new();
        let mut args = Map::new();
        args.insert("format".into(), json!("%Y"));
        let value = tool.execute(args).await.unwrap();
        assert_eq!(value.as_str().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn invalid_format_is_rejected() {
        let tool = CurrentTimeTool::new();
        let mut args = Map::new();
        args.insert("format".into(), json!("%Q"));
        assert!(tool.execute(args).await.is_err());
    }
}
