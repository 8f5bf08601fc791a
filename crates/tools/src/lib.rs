//! Tool implementations for quill agents.
//!
//! Built-ins (`calculator`, `get_current_time`), closure-backed tools for
//! embedding code, and external command tools loaded from TOML manifests.

pub mod calculator;
pub mod clock;
pub mod command;
pub mod function;

use quill_config::AppConfig;
use quill_core::tool::ToolRegistry;
use tracing::debug;

pub use calculator::CalculatorTool;
pub use clock::CurrentTimeTool;
pub use command::{CommandManifest, CommandTool, load_command_tools};
pub use function::FunctionTool;

/// Registry holding the built-in tools.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool::new()));
    registry.register(Box::new(CurrentTimeTool::new()));
    registry
}

/// Built-in tools plus, when `tools.auto_load` is set, the command tools
/// found in `tools.tools_dir`.
pub fn load_tools(config: &AppConfig) -> ToolRegistry {
    let mut registry = builtin_registry();
    if config.tools.auto_load {
        for tool in load_command_tools(&config.tools.tools_dir, config.execution.timeout_secs) {
            registry.register(Box::new(tool));
        }
    }
    debug!(count = registry.len(), "Tool registry ready");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = builtin_registry();
        assert_eq!(registry.names(), vec!["calculator", "get_current_time"]);
    }

    #[test]
    fn load_tools_respects_auto_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("date.toml"), "name = 'date'\nprogram = 'date'").unwrap();

        let mut config = AppConfig::default();
        config.tools.tools_dir = dir.path().to_path_buf();
        assert_eq!(load_tools(&config).len(), 3);

        config.tools.auto_load = false;
        assert_eq!(load_tools(&config).len(), 2);
    }
}
