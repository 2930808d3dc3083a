//! The tool-calling agent loop.

use chatscout_core::agent::AgentConfig;
use chatscout_core::chat::Chat;
use chatscout_core::error::{ProviderError, ToolError};
use chatscout_core::message::{Message, ToolCallRequest};
use chatscout_core::provider::GenerateOptions;
use chatscout_providers::Backend;
use chatscout_tools::ToolGateway;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to load tool catalog: {0}")]
    ToolCatalog(#[source] ToolError),

    /// The model call failed. Messages produced earlier in the run are kept
    /// here and remain in the chat.
    #[error("Model call failed: {source}")]
    Model {
        #[source]
        source: ProviderError,
        produced: Vec<Message>,
    },
}

impl AgentError {
    /// Messages appended to the chat before the failure.
    pub fn produced(&self) -> &[Message] {
        match self {
            AgentError::ToolCatalog(_) => &[],
            AgentError::Model { produced, .. } => produced,
        }
    }
}

/// Drives a chat between a model backend and the tool gateway.
pub struct AgentLoop {
    backend: Arc<dyn Backend>,

    /// No gateway means no tools are offered
    gateway: Option<Arc<ToolGateway>>,

    /// Maximum model calls per run
    max_iterations: u32,

    /// Clear one-shot generation options after a round of tool execution
    reset_options_after_tools: bool,
}

impl AgentLoop {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let defaults = AgentConfig::default();
        Self {
            backend,
            gateway: None,
            max_iterations: defaults.max_iterations,
            reset_options_after_tools: defaults.reset_options_after_tools,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<ToolGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Apply the loop tunables from configuration.
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.max_iterations = config.max_iterations;
        self.reset_options_after_tools = config.reset_options_after_tools;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run the chat until the model stops requesting tools.
    ///
    /// Each model choice and each tool result is appended to `chat` as it is
    /// produced. Returns every appended message in production order. Hitting
    /// the iteration ceiling is not an error: whatever was accumulated is
    /// returned.
    pub async fn run(
        &self,
        chat: &mut Chat,
        options: GenerateOptions,
    ) -> Result<Vec<Message>, AgentError> {
        let tools = match &self.gateway {
            Some(gateway) => gateway.tools().await.map_err(AgentError::ToolCatalog)?,
            None => Vec::new(),
        };
        let mut options = options.with_tools(tools);
        let mut produced = Vec::new();

        info!(
            model = %self.backend.model(),
            messages = chat.len(),
            tools = options.tools.len(),
            "Starting agent run"
        );

        for iteration in 1..=self.max_iterations {
            debug!(iteration, "Agent loop iteration");

            let response = match self.backend.generate(chat, &options).await {
                Ok(response) => response,
                Err(source) => {
                    warn!(iteration, error = %source, "Model call failed");
                    return Err(AgentError::Model { source, produced });
                }
            };

            let mut executed = 0usize;
            for choice in response.choices {
                let calls = choice.message.tool_calls().to_vec();
                chat.append(choice.message.clone());
                produced.push(choice.message);

                for call in &calls {
                    for result in self.dispatch(call).await {
                        chat.append(result.clone());
                        produced.push(result);
                    }
                    executed += 1;
                }
            }

            if executed == 0 {
                info!(iterations = iteration, produced = produced.len(), "Agent run complete");
                return Ok(produced);
            }

            debug!(iteration, tool_calls = executed, "Tool round complete");
            if self.reset_options_after_tools {
                options = options.without_one_shot();
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            produced = produced.len(),
            "Iteration ceiling reached, stopping"
        );
        Ok(produced)
    }

    /// Execute one tool call. Failures become a tool message so the model can react.
    async fn dispatch(&self, call: &ToolCallRequest) -> Vec<Message> {
        let outcome = match &self.gateway {
            Some(gateway) => gateway.call(call).await,
            None => Err(ToolError::NotConfigured),
        };

        match outcome {
            Ok(messages) => messages,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                vec![Message::tool_result(
                    &call.id,
                    format!("Error executing tool '{}': {e}", call.name),
                )]
            }
        }
    }
}
