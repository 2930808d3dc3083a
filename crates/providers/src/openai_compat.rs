//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, the Gemini OpenAI-compatibility endpoint, llama.cpp,
//! vLLM, and any endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Chat completions with every returned choice
//! - Tool use / function calling
//! - Structured output (`response_format` with a JSON schema), parsed per choice
//! - Quota errors carrying a retry-after hint

use async_trait::async_trait;
use chatscout_core::error::ProviderError;
use chatscout_core::message::{Message, ToolCallRequest};
use chatscout_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible chat-completions provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::Assistant {
                    content,
                    tool_calls,
                } => ApiMessage {
                    role: "assistant".into(),
                    content: content.clone(),
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments.clone(),
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: None,
                },
                other => ApiMessage {
                    role: other.role().as_str().into(),
                    content: Some(other.content().to_string()),
                    tool_calls: None,
                    tool_call_id: other.tool_call_id().map(String::from),
                },
            })
            .collect()
    }

    /// Convert tool descriptors to OpenAI API format.
    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                    strict: true,
                },
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        if let Some(format) = &request.response_format {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "schema": format.schema,
                    "strict": format.strict,
                }
            });
        }

        body
    }

    /// Convert a decoded API response into our response type.
    fn from_api_response(
        api_response: ApiResponse,
        parse_mode: bool,
    ) -> Result<ProviderResponse, ProviderError> {
        if api_response.choices.is_empty() {
            return Err(ProviderError::InvalidResponse("No choices in response".into()));
        }

        let mut choices = Vec::with_capacity(api_response.choices.len());
        for (index, choice) in api_response.choices.into_iter().enumerate() {
            let tool_calls: Vec<ToolCallRequest> = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCallRequest::new(tc.id, tc.function.name, tc.function.arguments))
                .collect();

            let parsed = match (&choice.message.content, parse_mode) {
                (Some(content), true) => Some(serde_json::from_str(content).map_err(|e| {
                    ProviderError::InvalidResponse(format!(
                        "choice {index} does not match the response format: {e}"
                    ))
                })?),
                _ => None,
            };

            choices.push(Choice {
                message: Message::assistant_with_tools(choice.message.content, tool_calls),
                finish_reason: choice.finish_reason,
                parsed,
            });
        }

        Ok(ProviderResponse {
            choices,
            model: api_response.model,
            usage: api_response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

/// Longest retry hint honoured. Anything longer is treated as no hint, so
/// recovery moves straight on to the fallbacks.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// A hint of `secs` seconds, clamped at zero.
///
/// `None` for non-finite values and for anything over [`MAX_RETRY_AFTER`].
fn retry_hint(secs: f64) -> Option<Duration> {
    let delay = Duration::try_from_secs_f64(secs.max(0.0)).ok()?;
    (delay <= MAX_RETRY_AFTER).then_some(delay)
}

/// Seconds from a `retry-after` header value.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    retry_hint(value.trim().parse().ok()?)
}

/// Retry hint carried in a 429 body: a top-level `retry_after` number, or a
/// Google RPC `RetryInfo` detail such as `"retryDelay": "37s"`.
fn parse_retry_after_body(body: &serde_json::Value) -> Option<Duration> {
    let body = match body {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };

    if let Some(secs) = body.get("retry_after").and_then(|v| v.as_f64()) {
        return retry_hint(secs);
    }

    body.pointer("/error/details")
        .and_then(|d| d.as_array())?
        .iter()
        .filter_map(|detail| detail.get("retryDelay").and_then(|v| v.as_str()))
        .find_map(|delay| parse_retry_after_header(delay.trim_end_matches('s')))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let v = match v {
                serde_json::Value::Array(mut items) if !items.is_empty() => items.remove(0),
                other => other,
            };
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl chatscout_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request);
        let parse_mode = request.response_format.is_some();

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            parse_mode,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let header_hint = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_header);
            let error_body = response.text().await.unwrap_or_default();
            let retry_after = header_hint.or_else(|| {
                serde_json::from_str(&error_body)
                    .ok()
                    .and_then(|v| parse_retry_after_body(&v))
            });
            warn!(provider = %self.name, model = %request.model, ?retry_after, "Rate limited");
            return Err(ProviderError::RateLimited {
                retry_after,
                message: error_message(&error_body),
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_message(&error_body),
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::from_api_response(api_response, parse_mode)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
