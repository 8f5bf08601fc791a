//! `quill init` - write the default configuration.

use std::path::Path;

use quill_config::AppConfig;

pub fn run(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Edit it directly, or re-run with --force to overwrite it.");
        return Ok(());
    }

    AppConfig::write_default(path)?;
    println!("Wrote default configuration to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set OPENAI_API_KEY or CLAUDE_API_KEY (or add api_key under [providers.*])");
    println!("  2. Run: quill chat");
    Ok(())
}
