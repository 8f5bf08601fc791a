//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::sync::Mutex;

use quill_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins, then `-v` (debug), then `logging.level`. With
/// `logging.file` set, plain-text output goes to that file instead of stderr.
pub fn init(config: Option<&LoggingConfig>, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (verbose, config) {
        (true, _) => "debug",
        (false, Some(config)) => config.level.as_str(),
        (false, None) => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match config.and_then(|c| c.file.as_ref()) {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
