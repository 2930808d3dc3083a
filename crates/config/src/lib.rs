//! Configuration loading, validation, and management for chatscout.
//!
//! Loads configuration from `~/.chatscout/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chatscout_core::{AgentConfig, RouterConfig};

pub mod presets;

/// The root configuration structure.
///
/// Maps directly to `~/.chatscout/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the backend every run starts on
    #[serde(default = "default_primary")]
    pub primary: String,

    /// Ordered backend names tried when the primary is exhausted
    #[serde(default = "default_fallbacks")]
    pub fallbacks: Vec<String>,

    /// Only fall back onto backends marked `is_free`
    #[serde(default = "default_true")]
    pub free_tier_only: bool,

    /// Where chats are persisted when a backend hits its quota
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_store_dir: Option<PathBuf>,

    /// Known backends
    #[serde(default = "presets::all")]
    pub backends: Vec<BackendConfig>,

    /// Tool server configuration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Observer suite configuration
    #[serde(default)]
    pub observers: ObserverConfig,

    /// Per-intent agent routing
    #[serde(default)]
    pub router: RouterConfig,
}

fn default_primary() -> String {
    presets::GEMINI_FLASH_LITE.into()
}
fn default_fallbacks() -> Vec<String> {
    vec![presets::GEMINI_FLASH.into(), presets::GEMINI_PRO.into()]
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// One model endpoint: where it lives, which model, and how hard it may be driven.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Display name, referenced by `primary` and `fallbacks`
    pub name: String,

    /// Base URL of the chat-completions API
    pub base_url: String,

    /// Model identifier sent to the endpoint
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable that overrides `api_key` at load time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Calls per second; absent means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,

    /// Free-tier backends are the only fallback targets by default
    #[serde(default)]
    pub is_free: bool,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .field("rate_limit", &self.rate_limit)
            .field("is_free", &self.is_free)
            .finish()
    }
}

impl BackendConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            api_key_env: None,
            rate_limit: None,
            is_free: false,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_rate_limit(mut self, calls_per_second: f64) -> Self {
        self.rate_limit = Some(calls_per_second);
        self
    }

    pub fn free(mut self) -> Self {
        self.is_free = true;
        self
    }

    /// Whether a non-empty credential is present.
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Minimum spacing between calls implied by `rate_limit`.
    ///
    /// `None` for an absent, non-finite, or non-positive rate, and for a
    /// rate whose interval is too long to represent.
    pub fn min_interval(&self) -> Option<Duration> {
        match self.rate_limit {
            Some(rate) if rate.is_finite() && rate > 0.0 => {
                Duration::try_from_secs_f64(1.0 / rate).ok()
            }
            _ => None,
        }
    }

    /// Replace `api_key` with the value of `api_key_env`, when that variable is set.
    fn apply_env(&mut self) {
        if let Some(var) = &self.api_key_env {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    self.api_key = Some(value);
                }
            }
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Streamable-HTTP tool server endpoint; absent means no remote tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Tool names the agent may call; absent means every listed tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,

    /// Per-request timeout for the tool server
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            url: Some("http://127.0.0.1:8000/mcp".into()),
            bearer_token: None,
            allowed: None,
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("url", &self.url)
            .field("bearer_token", &redact(&self.bearer_token))
            .field("allowed", &self.allowed)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    #[serde(default = "default_analytics_dir")]
    pub analytics_dir: PathBuf,

    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,

    /// Recorded on every audit entry
    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default)]
    pub rate_limit: RateLimitPolicyConfig,
}

fn default_history_dir() -> PathBuf {
    AppConfig::data_dir().join("history")
}
fn default_analytics_dir() -> PathBuf {
    AppConfig::data_dir().join("analytics")
}
fn default_audit_dir() -> PathBuf {
    AppConfig::data_dir().join("audit")
}
fn default_user_id() -> String {
    "anonymous".into()
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_dir: default_history_dir(),
            analytics_dir: default_analytics_dir(),
            audit_dir: default_audit_dir(),
            user_id: default_user_id(),
            rate_limit: RateLimitPolicyConfig::default(),
        }
    }
}

/// Limits enforced on user messages by the rate-limit policy observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicyConfig {
    #[serde(default = "default_max_per_session")]
    pub max_per_session: u32,

    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: u32,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_max_per_session() -> u32 {
    100
}
fn default_max_per_minute() -> u32 {
    20
}
fn default_cooldown_secs() -> u64 {
    60
}

impl Default for RateLimitPolicyConfig {
    fn default() -> Self {
        Self {
            max_per_session: default_max_per_session(),
            max_per_minute: default_max_per_minute(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            fallbacks: default_fallbacks(),
            free_tier_only: true,
            chat_store_dir: Some(Self::data_dir().join("chats")),
            backends: presets::all(),
            tools: ToolsConfig::default(),
            agent: AgentConfig::default(),
            observers: ObserverConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.chatscout/config.toml).
    ///
    /// Environment overrides:
    /// - `CHATSCOUT_PRIMARY` replaces the primary backend name
    /// - each backend's `api_key_env` replaces its `api_key`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&Self::config_dir().join("config.toml"))
    }

    /// Like [`AppConfig::load`], reading `path` instead of the default location.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if let Ok(primary) = std::env::var("CHATSCOUT_PRIMARY") {
            config.primary = primary;
        }
        config.apply_env();
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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatscout")
    }

    /// Default root for histories, analytics, audit logs and persisted chats.
    pub fn data_dir() -> PathBuf {
        Self::config_dir().join("data")
    }

    /// Resolve credentials from each backend's `api_key_env`.
    pub fn apply_env(&mut self) {
        for backend in &mut self.backends {
            backend.apply_env();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate backend name '{}'",
                    backend.name
                )));
            }
            if backend.base_url.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{}' has an empty base_url",
                    backend.name
                )));
            }
            if backend.rate_limit.is_some() && backend.min_interval().is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{}' rate_limit must be a positive number above 1e-300",
                    backend.name
                )));
            }
        }

        for name in std::iter::once(&self.primary).chain(&self.fallbacks) {
            if self.backend(name).is_none() {
                return Err(ConfigError::UnknownBackend(name.clone()));
            }
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        let mut labels = std::collections::HashSet::new();
        for label in self.router.labels() {
            if label.trim().is_empty() || label != label.trim().to_lowercase() {
                return Err(ConfigError::ValidationError(format!(
                    "router intent label '{label}' must be non-empty lowercase without surrounding spaces"
                )));
            }
            if !labels.insert(label) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate router intent '{label}'"
                )));
            }
        }
        if self.router.intent(&self.router.default_intent).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "router.default_intent '{}' is not one of the router intents",
                self.router.default_intent
            )));
        }

        Ok(())
    }

    /// Look up a backend by name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// The primary backend followed by its fallbacks, in order.
    ///
    /// A fallback equal to the primary is dropped.
    pub fn backend_chain(&self) -> Result<(BackendConfig, Vec<BackendConfig>), ConfigError> {
        let primary = self
            .backend(&self.primary)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownBackend(self.primary.clone()))?;

        let mut fallbacks = Vec::with_capacity(self.fallbacks.len());
        for name in &self.fallbacks {
            if *name == self.primary {
                continue;
            }
            let backend = self
                .backend(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownBackend(name.clone()))?;
            fallbacks.push(backend);
        }
        Ok((primary, fallbacks))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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

    #[error("Unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.primary, presets::GEMINI_FLASH_LITE);
        assert!(config.free_tier_only);
        assert_eq!(config.agent.max_iterations, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.primary, config.primary);
        assert_eq!(parsed.backends, config.backends);
        assert_eq!(parsed.observers.rate_limit, config.observers.rate_limit);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.backends.len(), 5);
    }

    #[test]
    fn load_from_file_with_custom_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
primary = "local"
fallbacks = []

[[backends]]
name = "local"
base_url = "http://127.0.0.1:9000/v1"
model = "qwen"
rate_limit = 0.5
is_free = true

[tools]
allowed = ["search_products_tool"]

[agent]
max_iterations = 4

[observers.rate_limit]
max_per_minute = 5
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.primary, "local");
        assert_eq!(config.agent.max_iterations, 4);
        assert!(config.agent.reset_options_after_tools);
        assert_eq!(config.observers.rate_limit.max_per_minute, 5);
        assert_eq!(config.observers.rate_limit.max_per_session, 100);
        assert_eq!(
            config.tools.allowed.as_deref(),
            Some(&["search_products_tool".to_string()][..])
        );

        let (primary, fallbacks) = config.backend_chain().unwrap();
        assert_eq!(primary.min_interval(), Some(Duration::from_secs(2)));
        assert!(fallbacks.is_empty());
    }

    #[test]
    fn unknown_primary_rejected() {
        let config = AppConfig {
            primary: "nope".into(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownBackend(name)) if name == "nope"
        ));
    }

    #[test]
    fn non_positive_rate_rejected() {
        let mut config = AppConfig::default();
        config.backends[0].rate_limit = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn vanishing_rate_rejected() {
        let mut config = AppConfig::default();
        config.backends[0].rate_limit = Some(1e-320);
        assert_eq!(config.backends[0].min_interval(), None);
        assert!(config.validate().is_err());
    }

    #[test]
    fn router_default_must_be_an_intent() {
        let mut config = AppConfig::default();
        config.router.default_intent = "billing".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("billing"));
    }

    #[test]
    fn router_labels_must_be_unique_and_lowercase() {
        let mut config = AppConfig::default();
        config.router.intents.push(chatscout_core::IntentConfig::new("order"));
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.router.intents[1].label = "Order".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn router_section_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[router]
enabled = true
default_intent = "data"

[[router.intents]]
label = "data"
allowed_tools = ["search_products_tool"]

[[router.intents]]
label = "order"
system_prompt = "You take orders."
"#,
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.router.enabled);
        assert_eq!(config.router.intent("order").unwrap().system_prompt.as_deref(), Some("You take orders."));
    }

    #[test]
    fn backend_chain_skips_primary_in_fallbacks() {
        let config = AppConfig {
            fallbacks: vec![
                presets::GEMINI_FLASH_LITE.into(),
                presets::GPT5.into(),
            ],
            ..AppConfig::default()
        };
        let (primary, fallbacks) = config.backend_chain().unwrap();
        assert_eq!(primary.name, presets::GEMINI_FLASH_LITE);
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].name, presets::GPT5);
    }

    #[test]
    fn min_interval_absent_for_unlimited() {
        let backend = BackendConfig::new("x", "http://x", "m");
        assert_eq!(backend.min_interval(), None);
        let backend = backend.with_rate_limit(4.0);
        assert_eq!(backend.min_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let backend = BackendConfig::new("x", "http://x", "m").with_api_key("sk-secret-123");
        let debug = format!("{:?}", backend);
        assert!(!debug.contains("sk-secret-123"));
        assert!(debug.contains("[REDACTED]"));

        let tools = ToolsConfig {
            bearer_token: Some("tok-abc".into()),
            ..ToolsConfig::default()
        };
        assert!(!format!("{:?}", tools).contains("tok-abc"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini-2.5-flash-lite"));
        assert!(toml_str.contains("max_per_session"));
    }
}
