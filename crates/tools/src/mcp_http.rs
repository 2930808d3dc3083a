//! MCP client over the streamable-HTTP transport.
//!
//! Every JSON-RPC message is a POST to one endpoint. Responses arrive either
//! as a JSON body or as a short `text/event-stream` carrying the response
//! event. The server assigns a session id on `initialize` (`Mcp-Session-Id`),
//! which is echoed on every later request and released with a DELETE.

use async_trait::async_trait;
use chatscout_core::error::ToolError;
use chatscout_core::provider::ToolDescriptor;
use chatscout_core::tool::ContentBlock;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::transport::{ToolSession, ToolTransport};

const HEADER_SESSION_ID: &str = "Mcp-Session-Id";
const HEADER_PROTOCOL_VERSION: &str = "MCP-Protocol-Version";
const PROTOCOL_VERSION: &str = "2025-03-26";
const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const JSON_MIME_TYPE: &str = "application/json";
/// Upper bound on `tools/list` pages fetched for one listing.
const MAX_LIST_PAGES: usize = 100;

/// Connects to a remote MCP tool server.
#[derive(Clone)]
pub struct StreamableHttpTransport {
    url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
    client_name: String,
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("url", &self.url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl StreamableHttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            bearer_token: None,
            client,
            client_name: env!("CARGO_PKG_NAME").to_string(),
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ToolTransport for StreamableHttpTransport {
    fn name(&self) -> &str {
        "mcp-http"
    }

    async fn open(&self) -> Result<Box<dyn ToolSession>, ToolError> {
        let mut session = McpHttpSession {
            client: self.client.clone(),
            url: self.url.clone(),
            bearer_token: self.bearer_token.clone(),
            session_id: None,
            initialized: false,
            closed: false,
            next_id: 0,
        };
        if let Err(e) = session.initialize(&self.client_name).await {
            // The server may already hold a session for us.
            if let Err(close_err) = session.close().await {
                warn!(error = %close_err, "Failed to release MCP session after failed initialize");
            }
            return Err(e);
        }
        Ok(Box::new(session))
    }
}

struct McpHttpSession {
    client: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
    session_id: Option<String>,
    initialized: bool,
    closed: bool,
    next_id: u64,
}

impl McpHttpSession {
    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder;
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(session_id) = &self.session_id {
            builder = builder.header(HEADER_SESSION_ID, session_id);
        }
        if self.initialized {
            builder = builder.header(HEADER_PROTOCOL_VERSION, PROTOCOL_VERSION);
        }
        builder
    }

    async fn initialize(&mut self, client_name: &str) -> Result<(), ToolError> {
        let result = self
            .rpc(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": client_name,
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        self.initialized = true;
        debug!(
            url = %self.url,
            session = ?self.session_id,
            server = %result.pointer("/serverInfo/name").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "MCP session initialized"
        );
        self.notify("notifications/initialized").await
    }

    /// Send a request and wait for its result.
    async fn rpc(&mut self, method: &str, params: Value) -> Result<Value, ToolError> {
        if self.closed {
            return Err(ToolError::Transport("session already closed".into()));
        }
        self.next_id += 1;
        let id = self.next_id;
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "MCP request");

        let response = self
            .request(self.client.post(&self.url))
            .header(ACCEPT, format!("{JSON_MIME_TYPE}, {EVENT_STREAM_MIME_TYPE}"))
            .json(&message)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transport(format!(
                "{method} failed with HTTP {status}: {body}"
            )));
        }

        if let Some(session_id) = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let reply = match content_type.as_deref() {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) => parse_sse_messages(&body)
                .into_iter()
                .find(|m| m.get("id").and_then(Value::as_u64) == Some(id))
                .ok_or_else(|| {
                    ToolError::Protocol(format!("no response to {method} in event stream"))
                })?,
            _ => serde_json::from_str::<Value>(&body)
                .map_err(|e| ToolError::Protocol(format!("invalid {method} response: {e}")))?,
        };

        if let Some(error) = reply.get("error") {
            return Err(ToolError::Protocol(format!(
                "{method} returned error {}: {}",
                error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                error.get("message").and_then(Value::as_str).unwrap_or("unknown error"),
            )));
        }

        reply
            .get("result")
            .cloned()
            .ok_or_else(|| ToolError::Protocol(format!("{method} response has no result")))
    }

    /// Send a notification; any 2xx is accepted whatever the body.
    async fn notify(&mut self, method: &str) -> Result<(), ToolError> {
        let message = json!({ "jsonrpc": "2.0", "method": method });
        let response = self
            .request(self.client.post(&self.url))
            .header(ACCEPT, format!("{JSON_MIME_TYPE}, {EVENT_STREAM_MIME_TYPE}"))
            .json(&message)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Transport(format!(
                "{method} failed with HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ToolSession for McpHttpSession {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.rpc("tools/list", params).await?;

            let page = result
                .get("tools")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()));
            let page: Vec<ToolDescriptor> = serde_json::from_value(page)
                .map_err(|e| ToolError::Protocol(format!("invalid tool listing: {e}")))?;
            tools.extend(page);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(String::from);
            match &cursor {
                None => {
                    debug!(count = tools.len(), "Listed MCP tools");
                    return Ok(tools);
                }
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    return Err(ToolError::Protocol(format!(
                        "tools/list repeated cursor '{next}'"
                    )));
                }
                Some(_) => {}
            }
        }

        Err(ToolError::Protocol(format!(
            "tools/list did not finish within {MAX_LIST_PAGES} pages"
        )))
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        let result = self
            .rpc("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        let blocks: Vec<ContentBlock> = result
            .get("content")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(content_block).collect())
            .unwrap_or_default();

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            let reason = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason,
            });
        }

        Ok(blocks)
    }

    async fn close(&mut self) -> Result<(), ToolError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.session_id.is_none() {
            return Ok(());
        }

        let response = self
            .request(self.client.delete(&self.url))
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        if !status.is_success() {
            warn!(%status, "MCP server rejected session close");
            return Err(ToolError::Transport(format!("DELETE failed with HTTP {status}")));
        }
        Ok(())
    }
}

/// Decode one MCP content block.
fn content_block(item: &Value) -> ContentBlock {
    let kind = item.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "text" => ContentBlock::Text {
            text: item
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        "resource" => {
            let resource = item.get("resource").unwrap_or(item);
            let field = |key: &str| {
                resource
                    .get(key)
                    .and_then(Value::as_str)
                    .map(String::from)
            };
            ContentBlock::Resource {
                uri: field("uri").unwrap_or_default(),
                mime_type: field("mimeType"),
                text: field("text"),
            }
        }
        other => ContentBlock::Other {
            kind: if other.is_empty() { "<missing>".into() } else { other.into() },
        },
    }
}

/// Split an event-stream body into the JSON payload of each event.
fn parse_sse_messages(body: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut data = String::new();

    let mut flush = |data: &mut String| {
        if !data.is_empty() {
            match serde_json::from_str(data) {
                Ok(value) => messages.push(value),
                Err(e) => trace!(error = %e, "Ignoring unparseable SSE event"),
            }
            data.clear();
        }
    };

    for line in body.lines() {
        if line.is_empty() {
            flush(&mut data);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data);

    messages
}
