//! `quill tools` - list the tools a chat session would register.

use quill_config::AppConfig;

pub fn run(config: &AppConfig) {
    let registry = quill_tools::load_tools(config);
    println!("Available tools ({}):", registry.len());
    for tool in registry.iter() {
        let marker = if tool.return_direct() { " [direct]" } else { "" };
        println!();
        println!("  {}{marker}", tool.name());
        println!("    {}", tool.description());
        for p in tool.parameters() {
            let required = if p.required { "required" } else { "optional" };
            println!("    - {} ({}, {required}): {}", p.name, p.param_type.as_str(), p.description);
        }
    }
    if !config.tools.auto_load {
        println!();
        println!("Command tools are not loaded (tools.auto_load = false).");
    }
}
