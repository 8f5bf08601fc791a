//! Configuration loading, validation, and defaults for Quill.
//!
//! Configuration lives in a TOML file (`quill.toml` by default). When the file
//! is missing, [`AppConfig::load_or_init`] writes the defaults so the user has
//! something to edit. API keys may come from the environment instead of the
//! file: `OPENAI_API_KEY`, `CLAUDE_API_KEY`, or `ANTHROPIC_API_KEY`.

use quill_core::SamplingParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "quill.toml";

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider id used when an agent does not name one
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-provider settings, keyed by provider id
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert("openai".to_string(), ProviderConfig::defaults_for("openai"));
    providers.insert("claude".to_string(), ProviderConfig::defaults_for("claude"));
    providers
}

fn default_true() -> bool {
    true
}

/// Default API base URL for a known provider id.
pub fn default_api_base(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "claude" => Some("https://api.anthropic.com"),
        _ => None,
    }
}

/// Default model for a known provider id.
pub fn default_model(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("gpt-4o"),
        "claude" => Some("claude-3-opus-20240229"),
        _ => None,
    }
}

/// Settings for one chat-completion backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}

impl ProviderConfig {
    /// The settings written to a fresh config file for `provider`.
    pub fn defaults_for(provider: &str) -> Self {
        let openai = provider == "openai";
        Self {
            api_key: None,
            api_base: default_api_base(provider).map(String::from),
            model: default_model(provider).map(String::from),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: openai.then_some(1.0),
            frequency_penalty: openai.then_some(0.0),
            presence_penalty: openai.then_some(0.0),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            model: None,
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// A provider's settings with defaults and environment overrides applied.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub id: String,
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
    pub sampling: SamplingParams,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("id", &self.id)
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_expiry_days")]
    pub expiry_days: u64,

    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,
}

fn default_expiry_days() -> u64 {
    7
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_days: default_expiry_days(),
            directory: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Size of the recent-turn window sent to the model
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,

    #[serde(default = "default_true")]
    pub long_term_enabled: bool,

    #[serde(default = "default_db_path")]
    pub long_term_db_path: PathBuf,
}

fn default_short_term_capacity() -> usize {
    10
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./memory/agent_memory.db")
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: default_short_term_capacity(),
            long_term_enabled: true,
            long_term_db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Load command tool manifests from `tools_dir` at startup
    #[serde(default = "default_true")]
    pub auto_load: bool,

    #[serde(default = "default_tools_dir")]
    pub tools_dir: PathBuf,
}

fn default_tools_dir() -> PathBuf {
    PathBuf::from("./tools")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_load: true,
            tools_dir: default_tools_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Timeout for external command tools
    #[serde(default = "default_execution_timeout")]
    pub timeout_secs: u64,

    /// Maximum tool dispatch rounds per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_execution_timeout() -> u64 {
    60
}
fn default_max_iterations() -> usize {
    10
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_execution_timeout(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific file path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration, writing the defaults to `path` first if it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::write_default(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }
        Self::load_from(path)
    }

    /// Write the default configuration to `path`, creating parent directories.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, Self::default_toml()).map_err(write_err)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_provider.trim().is_empty() {
            return Err(ConfigError::ValidationError("default_provider must not be empty".into()));
        }

        for (id, provider) in &self.providers {
            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{id}.temperature must be between 0.0 and 2.0"
                )));
            }
            if provider.max_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{id}.max_tokens must be > 0"
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{id}.timeout_secs must be > 0"
                )));
            }
        }

        if self.execution.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "execution.max_iterations must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve a provider's settings, reading API keys from the process environment.
    pub fn provider(&self, id: &str) -> Option<ResolvedProvider> {
        self.resolve_provider(id, |key| std::env::var(key).ok())
    }

    /// Resolve a provider's settings with a custom environment lookup.
    ///
    /// Returns `None` for an id that is neither configured nor known.
    /// Environment keys take precedence over the file.
    pub fn resolve_provider(&self, id: &str, env: impl Fn(&str) -> Option<String>) -> Option<ResolvedProvider> {
        let config = match self.providers.get(id) {
            Some(config) => config.clone(),
            None if default_api_base(id).is_some() => ProviderConfig::defaults_for(id),
            None => return None,
        };

        let mut env_keys = vec![format!("{}_API_KEY", id.to_uppercase())];
        if id == "claude" {
            env_keys.push("ANTHROPIC_API_KEY".into());
        }
        let api_key = env_keys
            .iter()
            .find_map(|key| env(key).filter(|v| !v.is_empty()))
            .or(config.api_key.clone());

        let api_base = config
            .api_base
            .clone()
            .or_else(|| default_api_base(id).map(String::from))?;
        let model = config
            .model
            .clone()
            .or_else(|| default_model(id).map(String::from))?;

        Some(ResolvedProvider {
            id: id.to_string(),
            api_key,
            api_base,
            model,
            timeout_secs: config.timeout_secs,
            sampling: SamplingParams {
                temperature: config.temperature,
                max_tokens: Some(config.max_tokens),
                top_p: config.top_p,
                frequency_penalty: config.frequency_penalty,
                presence_penalty: config.presence_penalty,
            },
        })
    }

    /// Generate the default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: default_providers(),
            cache: CacheConfig::default(),
            memory: MemoryConfig::default(),
            logging: LoggingConfig::default(),
            tools: ToolsConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.memory.short_term_capacity, 10);
        assert_eq!(config.cache.expiry_days, 7);
        assert_eq!(config.execution.max_iterations, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.providers.len(), 2);
        assert_eq!(parsed.providers["openai"].top_p, Some(1.0));
        assert_eq!(parsed.providers["claude"].top_p, None);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
default_provider = "claude"

[providers.claude]
model = "claude-3-5-sonnet-latest"

[memory]
short_term_capacity = 4
"#,
        )
        .unwrap();
        assert_eq!(config.default_provider, "claude");
        assert_eq!(config.memory.short_term_capacity, 4);
        assert!(config.memory.long_term_enabled);
        assert!(!config.providers.contains_key("openai"));

        let claude = config.resolve_provider("claude", no_env).unwrap();
        assert_eq!(claude.model, "claude-3-5-sonnet-latest");
        assert_eq!(claude.api_base, "https://api.anthropic.com");

        // Known ids resolve even without a section.
        let openai = config.resolve_provider("openai", no_env).unwrap();
        assert_eq!(openai.model, "gpt-4o");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        if let Some(p) = config.providers.get_mut("openai") {
            p.temperature = 5.0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.execution.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/quill.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quill.toml");
        let config = AppConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.default_provider, "openai");

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("api.openai.com"));
        assert!(written.contains("short_term_capacity = 10"));
    }

    #[test]
    fn parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(&path, "default_provider = [").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_key_overrides_file() {
        let mut config = AppConfig::default();
        if let Some(p) = config.providers.get_mut("openai") {
            p.api_key = Some("from-file".into());
        }

        let resolved = config.resolve_provider("openai", no_env).unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("from-file"));

        let resolved = config
            .resolve_provider("openai", |k| (k == "OPENAI_API_KEY").then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("from-env"));

        let resolved = config
            .resolve_provider("claude", |k| (k == "ANTHROPIC_API_KEY").then(|| "ant".to_string()))
            .unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("ant"));
    }

    #[test]
    fn unknown_provider_is_unresolved() {
        let config = AppConfig::default();
        assert!(config.resolve_provider("gemini", no_env).is_none());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig::default();
        if let Some(p) = config.providers.get_mut("openai") {
            p.api_key = Some("sk-secret".into());
        }
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
