//! External command tools declared through TOML manifests.
//!
//! A manifest describes one tool:
//!
//! ```toml
//! name = "word_count"
//! description = "Count the words in a file"
//! program = "wc"
//! args = ["-w", "{path}"]
//!
//! [[parameters]]
//! name = "path"
//! type = "string"
//! description = "File to count"
//! ```
//!
//! `{param}` placeholders in `args` are replaced with the bound argument
//! values. The program is spawned directly (no shell), its trimmed stdout is
//! the tool output and a non-zero exit status is an execution failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolParameter, output_text};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct CommandManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub return_direct: bool,
    /// Overrides the execution timeout for this tool.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

pub struct CommandTool {
    manifest: CommandManifest,
    timeout_secs: u64,
}

impl CommandTool {
    pub fn new(manifest: CommandManifest, default_timeout_secs: u64) -> Self {
        let timeout_secs = manifest.timeout_secs.unwrap_or(default_timeout_secs);
        Self { manifest, timeout_secs }
    }

    /// Parse a manifest from TOML text.
    pub fn from_toml(text: &str, default_timeout_secs: u64) -> Result<Self, toml::de::Error> {
        let manifest: CommandManifest = toml::from_str(text)?;
        Ok(Self::new(manifest, default_timeout_secs))
    }

    pub fn manifest(&self) -> &CommandManifest {
        &self.manifest
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Expand `{param}` placeholders. An argument that is exactly one
    /// placeholder for an absent optional parameter is dropped.
    fn render_args(&self, arguments: &Map<String, Value>) -> Vec<String> {
        let mut rendered = Vec::with_capacity(self.manifest.args.len());
        for template in &self.manifest.args {
            let lone_key = template.strip_prefix('{').and_then(|t| t.strip_suffix('}'));
            let absent = lone_key.is_some_and(|key| {
                self.manifest.parameters.iter().any(|p| p.name == key) && !arguments.contains_key(key)
            });
            if absent {
                continue;
            }

            let mut arg = template.clone();
            for p in &self.manifest.parameters {
                let placeholder = format!("{{{}}}", p.name);
                if arg.contains(&placeholder) {
                    let value = arguments.get(&p.name).map(output_text).unwrap_or_default();
                    arg = arg.replace(&placeholder, &value);
                }
            }
            rendered.push(arg);
        }
        rendered
    }

    fn failure(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.manifest.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.manifest.parameters
    }

    fn return_direct(&self) -> bool {
        self.manifest.return_direct
    }

    fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("kind".into(), Value::from("command"));
        metadata.insert("program".into(), Value::from(self.manifest.program.clone()));
        metadata
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let args = self.render_args(&arguments);
        debug!(tool = %self.manifest.name, program = %self.manifest.program, ?args, "Running command tool");

        let mut command = Command::new(&self.manifest.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.manifest.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| self.failure(format!("failed to start '{}': {e}", self.manifest.program)))?;

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: self.manifest.name.clone(),
                timeout_secs: self.timeout_secs,
            })?
            .map_err(|e| self.failure(e.to_string()))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(tool = %self.manifest.name, exit_code = code, "Command tool failed");
            return Err(self.failure(format!("exit code {code}: {}", stderr.trim())));
        }

        Ok(Value::String(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }
}

/// Load every `*.toml` manifest in `dir`, in file name order.
///
/// A missing directory yields no tools; unreadable or invalid manifests are
/// skipped with a warning.
pub fn load_command_tools(dir: &Path, default_timeout_secs: u64) -> Vec<CommandTool> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "No command tool directory");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut tools = Vec::new();
    for path in paths {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read tool manifest");
                continue;
            }
        };
        match CommandTool::from_toml(&text, default_timeout_secs) {
            Ok(tool) => {
                info!(tool = %tool.name(), path = %path.display(), "Loaded command tool");
                tools.push(tool);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Invalid tool manifest"),
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::tool::{ParamType, ToolCall, ToolRegistry};
    use serde_json::json;

    const ECHO: &str = r#"
name = "shout"
description = "Echo a word"
program = "echo"
args = ["{word}", "{suffix}"]

[[parameters]]
name = "word"
type = "string"
description = "Word to echo"

[[parameters]]
name = "suffix"
type = "string"
description = "Optional suffix"
required = false
"#;

    #[test]
    fn manifest_parses_parameters() {
        let tool = CommandTool::from_toml(ECHO, 60).unwrap();
        assert_eq!(tool.name(), "shout");
        assert_eq!(tool.timeout_secs(), 60);
        assert_eq!(tool.parameters().len(), 2);
        assert_eq!(tool.parameters()[0].param_type, ParamType::String);
        assert!(tool.parameters()[0].required);
        assert!(!tool.parameters()[1].required);
        assert_eq!(tool.metadata()["program"], "echo");
    }

    #[test]
    fn absent_optional_placeholder_is_dropped() {
        let tool = CommandTool::from_toml(ECHO, 60).unwrap();
        let mut args = Map::new();
        args.insert("word".into(), json!("hi"));
        assert_eq!(tool.render_args(&args), vec!["hi"]);

        args.insert("suffix".into(), json!(3));
        assert_eq!(tool.render_args(&args), vec!["hi", "3"]);
    }

    #[test]
    fn invalid_manifest_is_an_error() {
        assert!(CommandTool::from_toml("name = 'x'", 60).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_program_and_trims_stdout() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CommandTool::from_toml(ECHO, 60).unwrap()));
        let call = ToolCall {
            id: "c1".into(),
            name: "shout".into(),
            arguments: json!({"word": "hello"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.output, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let tool = CommandTool::from_toml("name = 'nope'\nprogram = 'false'", 60).unwrap();
        let err = tool.execute(Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let tool = CommandTool::from_toml("name = 'nap'\nprogram = 'sleep'\nargs = ['5']\ntimeout_secs = 1", 60).unwrap();
        let err = tool.execute(Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let tool = CommandTool::from_toml("name = 'ghost'\nprogram = 'quill-no-such-program'", 60).unwrap();
        let err = tool.execute(Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }

    #[test]
    fn load_skips_bad_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_shout.toml"), ECHO).unwrap();
        std::fs::write(dir.path().join("a_date.toml"), "name = 'date'\nprogram = 'date'").unwrap();
        std::fs::write(dir.path().join("broken.toml"), "name = ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let tools = load_command_tools(dir.path(), 30);
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["date", "shout"]);
    }

    #[test]
    fn load_from_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_command_tools(&dir.path().join("nope"), 30).is_empty());
    }
}
