//! Agent loop and intent routing configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the tool-calling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per run (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Drop one-shot generation options once tools have run
    #[serde(default = "default_true")]
    pub reset_options_after_tools: bool,

    /// Prepended to fresh conversations by the CLI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            reset_options_after_tools: true,
            system_prompt: None,
        }
    }
}

/// Splits a conversation across per-intent agents.
///
/// When enabled, every user message is classified into one of the intent
/// labels and handled by that intent's agent, each keeping its own chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Label used when classification fails or names no known intent
    #[serde(default = "default_intent")]
    pub default_intent: String,

    /// Replaces the generated classifier instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_prompt: Option<String>,

    #[serde(default = "default_intents")]
    pub intents: Vec<IntentConfig>,
}

/// One routable intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentConfig {
    pub label: String,

    /// Seeds this intent's chat; falls back to `agent.system_prompt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Tools this intent may call; falls back to `tools.allowed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
}

impl IntentConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            system_prompt: None,
            allowed_tools: None,
        }
    }
}

fn default_intent() -> String {
    "data".into()
}

fn default_intents() -> Vec<IntentConfig> {
    vec![IntentConfig::new("data"), IntentConfig::new("order")]
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_intent: default_intent(),
            classifier_prompt: None,
            intents: default_intents(),
        }
    }
}

impl RouterConfig {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.intents.iter().map(|i| i.label.as_str())
    }

    pub fn intent(&self, label: &str) -> Option<&IntentConfig> {
        self.intents.iter().find(|i| i.label == label)
    }
}
