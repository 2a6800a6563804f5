use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "anthropic-ollama-proxy";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
}

/// Where the chat backend lives and how long a single call may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Knobs consulted while building backend requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Backend model used when the wire model has no entry in `models`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Wire model name -> backend model name.
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u64>,
    /// Forward `tool_use` blocks of prior turns as backend tool calls.
    #[serde(default = "default_echo_tool_calls")]
    pub echo_tool_calls: bool,
}

fn default_port() -> u16 {
    3880
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_model() -> String {
    "qwen2.5-coder:14b".to_string()
}

fn default_max_tokens() -> u64 {
    256
}

fn default_echo_tool_calls() -> bool {
    true
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            backend: BackendConfig::default(),
            translation: TranslationConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            models: HashMap::new(),
            default_max_tokens: default_max_tokens(),
            num_ctx: None,
            echo_tool_calls: default_echo_tool_calls(),
        }
    }
}

impl BackendConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TranslationConfig {
    /// Backend model for a wire model name, falling back to the default model.
    #[must_use]
    pub fn backend_model(&self, wire_model: &str) -> &str {
        self.models
            .get(wire_model)
            .map_or(self.model.as_str(), String::as_str)
    }
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search standard locations for a config file, falling back to defaults.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject configurations that cannot possibly reach a backend.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.backend.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ProxyError::config(format!(
                "Backend endpoint '{}' must start with http:// or https://",
                self.backend.endpoint
            )));
        }
        if self.translation.model.trim().is_empty() {
            return Err(ProxyError::config("Backend model must not be empty"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ProxyError::config("Backend timeout must be at least one second"));
        }
        Ok(())
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(format!("{CONFIG_DIR_NAME}.toml"))];

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join(CONFIG_DIR_NAME).join("config.toml"));
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join(CONFIG_DIR_NAME).join("config.toml"));
        paths.push(home.join(format!(".{CONFIG_DIR_NAME}.toml")));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
