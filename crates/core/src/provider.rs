//! Provider trait: the abstraction over chat-completion endpoints.
//!
//! A Provider knows how to send a conversation to a model and get the
//! response choices back. Resilience (rate limiting, retry, fallback) lives
//! one layer up, in the model backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// A tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's input
    #[serde(default = "empty_object_schema", alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A JSON schema the model's output must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: serde_json::Value,
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

impl ResponseFormat {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }
}

/// Per-call generation options.
///
/// Everything except `tools` is a one-shot option: the agent loop clears
/// them after a round of tool execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub tools: Vec<ToolDescriptor>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub response_format: Option<ResponseFormat>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// A copy with every one-shot option dropped; only the tools survive.
    pub fn without_one_shot(&self) -> Self {
        Self {
            tools: self.tools.clone(),
            ..Self::default()
        }
    }
}

/// A fully-resolved request for a provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gemini-2.5-flash", "gpt-5")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Tools the model may call
    pub tools: Vec<ToolDescriptor>,

    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,

    /// Switches the provider into schema-validated parse mode
    pub response_format: Option<ResponseFormat>,
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, options: &GenerateOptions) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: options.tools.clone(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stop: options.stop.clone(),
            response_format: options.response_format.clone(),
        }
    }
}

/// One candidate completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// The generated assistant message
    pub message: Message,

    pub finish_reason: Option<String>,

    /// The content decoded as JSON, when a response format was requested
    pub parsed: Option<serde_json::Value>,
}

impl Choice {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            finish_reason: None,
            parsed: None,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// All choices, in the order the endpoint returned them
    pub choices: Vec<Choice>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    pub usage: Option<Usage>,
}

impl ProviderResponse {
    /// A single-choice response carrying `message`.
    pub fn single(model: impl Into<String>, message: Message) -> Self {
        Self {
            choices: vec![Choice::new(message)],
            model: model.into(),
            usage: None,
        }
    }

    /// The messages of every choice, in order.
    pub fn messages(&self) -> Vec<Message> {
        self.choices.iter().map(|c| c.message.clone()).collect()
    }
}

/// The core Provider trait.
///
/// Every chat-completion endpoint implements this trait. The backend calls
/// `complete()` without knowing which endpoint sits behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai-compat").
    fn name(&self) -> &str;

    /// Send a request and get every choice back.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
