use quill_config::ConfigError;
use thiserror::Error;

/// Errors that prevent an agent from being built.
///
/// Everything else (backend, tool and storage failures) is degraded into
/// reply text or a log line.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
