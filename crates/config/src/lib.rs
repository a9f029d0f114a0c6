//! Configuration loading, validation, and model resolution for keel.
//!
//! Loads configuration from `~/.keel/config.toml` (or `$KEEL_CONFIG`) with
//! environment variable overrides. Validates all settings at startup.

pub mod models;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use models::{MODEL_ALIASES, PROVIDERS, ProviderSpec, expand_alias, provider_of};

/// The root configuration structure.
///
/// Maps directly to `~/.keel/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model id or alias (e.g. `sonnet`, `openai:gpt-4.1`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Provider-specific configurations, keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Custom per-model pricing, keyed by full model id
    #[serde(default)]
    pub pricing: BTreeMap<String, PricingOverrideConfig>,
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model turns per user message
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Skip confirmation for write and execute tools (never for denied commands)
    #[serde(default)]
    pub trust: bool,

    /// Default shell command timeout in milliseconds
    #[serde(default = "default_shell_timeout_ms")]
    pub shell_timeout_ms: u64,

    /// Auto memory facts older than this are evicted at startup
    #[serde(default = "default_memory_max_age_days")]
    pub memory_max_age_days: u32,
}

fn default_max_turns() -> u32 {
    100
}
fn default_shell_timeout_ms() -> u64 {
    30_000
}
fn default_memory_max_age_days() -> u32 {
    90
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            trust: false,
            shell_timeout_ms: default_shell_timeout_ms(),
            memory_max_age_days: default_memory_max_age_days(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("default_model", &self.default_model)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .field("pricing", &self.pricing)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path with environment overrides.
    ///
    /// - `KEEL_CONFIG`: alternate config file path
    /// - `KEEL_MODEL`, `KEEL_MAX_TURNS`, `KEEL_TRUST`
    /// - per-provider API keys (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, ...),
    ///   which take priority over keys in the file
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KEEL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_path());
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("KEEL_MODEL") {
            self.default_model = Some(model);
        }
        if let Some(turns) = lookup("KEEL_MAX_TURNS").and_then(|v| v.parse().ok()) {
            self.agent.max_turns = turns;
        }
        if let Some(trust) = lookup("KEEL_TRUST") {
            self.agent.trust = matches!(trust.as_str(), "1" | "true" | "yes");
        }

        for spec in PROVIDERS {
            if let Some(key) = lookup(spec.env_key).filter(|k| !k.is_empty()) {
                self.providers.entry(spec.name.to_string()).or_default().api_key = Some(key);
            }
        }

        if let Some(key) = lookup("OPENAI_COMPATIBLE_API_KEY") {
            self.providers.entry("custom".into()).or_default().api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_COMPATIBLE_BASE_URL") {
            self.providers.entry("custom".into()).or_default().base_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".keel")
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }

        if self.agent.shell_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "agent.shell_timeout_ms must be > 0".into(),
            ));
        }

        if let Some(bad) = self
            .pricing
            .iter()
            .find(|(_, p)| p.input_per_m < 0.0 || p.output_per_m < 0.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "pricing for '{}' must not be negative",
                bad.0
            )));
        }

        Ok(())
    }

    /// API key for a provider, if configured.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.as_deref())
            .filter(|k| !k.is_empty())
    }

    /// Base URL override for a provider, if configured.
    pub fn base_url(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider).and_then(|p| p.base_url.as_deref())
    }

    /// Providers with an API key, in detection order.
    pub fn available_providers(&self) -> Vec<&'static str> {
        let mut found: Vec<&'static str> = PROVIDERS
            .iter()
            .filter(|spec| self.api_key(spec.name).is_some())
            .map(|spec| spec.name)
            .collect();
        if self.api_key("custom").is_some() && self.base_url("custom").is_some() {
            found.push("custom");
        }
        found
    }

    /// Resolve the model to use.
    ///
    /// Precedence: explicit flag, then the configured default, then the
    /// default model of the first provider with a key.
    pub fn resolve_model_id(&self, flag: Option<&str>) -> Option<String> {
        if let Some(raw) = flag.or(self.default_model.as_deref()) {
            return Some(expand_alias(raw));
        }
        PROVIDERS
            .iter()
            .find(|spec| self.api_key(spec.name).is_some())
            .map(|spec| spec.default_model.to_string())
    }

    /// Generate a default config TOML string (for `keel config init`).
    pub fn default_toml() -> String {
        let config = Self {
            default_model: Some("sonnet".into()),
            ..Self::default()
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
pub fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
