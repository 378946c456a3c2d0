//! Configuration loading, validation, and management for kubeinteract.
//!
//! Loads configuration from `~/.kubeinteract/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.kubeinteract/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend kind: "openai" (any OpenAI-compatible endpoint) or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the model API (e.g. "https://api.openai.com/v1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// API key for the model API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// PEM file with an extra CA certificate for the model API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Kubeconfig handed to approved commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Parse fenced JSON actions out of plain text instead of relying on
    /// native function calling
    #[serde(default = "default_true")]
    pub enable_tool_use_shim: bool,

    /// Maximum send/confirm/invoke rounds per query
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Transport retry policy for chat sends
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_true() -> bool {
    true
}
fn default_max_iterations() -> usize {
    20
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
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("ca_cert", &self.ca_cert)
            .field("kubeconfig", &self.kubeconfig)
            .field("enable_tool_use_shim", &self.enable_tool_use_shim)
            .field("max_iterations", &self.max_iterations)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Exponential backoff policy for transport retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_secs() -> u64 {
    10
}
fn default_max_backoff_secs() -> u64 {
    60
}
fn default_backoff_factor() -> f64 {
    2.0
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            backoff_factor: default_backoff_factor(),
            jitter: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.kubeinteract/config.toml).
    ///
    /// Environment variables override the file:
    /// - `MODEL_API`, `MODEL_ID`, `MODEL_API_KEY`
    /// - `KUBEINTERACT_PROVIDER`
    /// - `KUBECONFIG` (only when no kubeconfig is configured)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = lookup("MODEL_API").filter(|v| !v.is_empty()) {
            self.api_url = Some(api_url);
        }
        if let Some(model) = lookup("MODEL_ID").filter(|v| !v.is_empty()) {
            self.model = Some(model);
        }
        if let Some(api_key) = lookup("MODEL_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = Some(api_key);
        }
        if let Some(provider) = lookup("KUBEINTERACT_PROVIDER").filter(|v| !v.is_empty()) {
            self.provider = provider;
        }
        if self.kubeconfig.is_none()
            && let Some(kubeconfig) = lookup("KUBECONFIG").filter(|v| !v.is_empty())
        {
            self.kubeconfig = Some(PathBuf::from(kubeconfig));
        }
    }

    /// The backend kind to use, inferring Ollama for local endpoints.
    pub fn resolved_provider(&self) -> &str {
        match &self.api_url {
            Some(url) if url.contains("localhost") || url.contains("127.0.0.1") => "ollama",
            _ => &self.provider,
        }
    }

    /// Kubeconfig path, falling back to `~/.kube/config`.
    pub fn kubeconfig_path(&self) -> PathBuf {
        self.kubeconfig
            .clone()
            .unwrap_or_else(|| dirs_home().join(".kube").join("config"))
    }

    /// The individual kubeconfig files. Like `KUBECONFIG`, the path may hold a
    /// list separated by the platform's path separator (`:` on Unix).
    pub fn kubeconfig_files(&self) -> Vec<PathBuf> {
        std::env::split_paths(&self.kubeconfig_path())
            .filter(|p| !p.as_os_str().is_empty())
            .collect()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kubeinteract")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.provider.as_str(), "openai" | "ollama") {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider '{}' (expected \"openai\" or \"ollama\")",
                self.provider
            )));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.backoff_factor must be >= 1.0".into(),
            ));
        }

        if self.retry.initial_backoff_secs > self.retry.max_backoff_secs {
            return Err(ConfigError::ValidationError(
                "retry.initial_backoff_secs must not exceed retry.max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Ensure the settings needed to talk to a model are present.
    pub fn require_model_endpoint(&self) -> Result<(&str, &str), ConfigError> {
        match (self.api_url.as_deref(), self.model.as_deref()) {
            (Some(api_url), Some(model)) if !api_url.is_empty() && !model.is_empty() => {
                Ok((api_url, model))
            }
            _ => Err(ConfigError::ValidationError(
                "please provide a valid api or model (MODEL_API / MODEL_ID)".into(),
            )),
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: None,
            api_key: None,
            model: None,
            ca_cert: None,
            kubeconfig: None,
            enable_tool_use_shim: true,
            max_iterations: default_max_iterations(),
            retry: RetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
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
