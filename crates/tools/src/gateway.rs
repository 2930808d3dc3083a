//! Tool Gateway: the agent's single entry point for tools.
//!
//! Resolves the tool catalog, enforces the allow-list, and turns a model's
//! tool-call request into tool messages. A session is opened per operation
//! and always closed before returning.

use chatscout_core::error::ToolError;
use chatscout_core::message::{Message, ToolCallRequest};
use chatscout_core::provider::ToolDescriptor;
use chatscout_core::tool::ContentBlock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::transport::{ToolSession, ToolTransport};

const TEXT_PLAIN: &str = "text/plain";

pub struct ToolGateway {
    transport: Option<Arc<dyn ToolTransport>>,
    allowed: Option<HashSet<String>>,
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("transport", &self.transport.as_ref().map(|t| t.name()))
            .field("allowed", &self.allowed)
            .finish()
    }
}

impl ToolGateway {
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            transport: Some(transport),
            allowed: None,
        }
    }

    /// A gateway with no tool backend: no tools, and calls fail.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            allowed: None,
        }
    }

    /// Restrict the gateway to these exact names. An empty list allows nothing.
    pub fn with_allowed_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed.as_ref().is_none_or(|a| a.contains(name))
    }

    /// The catalog visible to the model, filtered by the allow-list.
    pub async fn tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let Some(transport) = &self.transport else {
            return Ok(Vec::new());
        };

        let mut session = transport.open().await?;
        let listed = session.list_tools().await;
        close(session.as_mut(), transport.name()).await;

        let tools: Vec<ToolDescriptor> = listed?
            .into_iter()
            .filter(|t| self.is_allowed(&t.name))
            .collect();
        info!(transport = transport.name(), count = tools.len(), "Tool catalog loaded");
        Ok(tools)
    }

    /// Execute one tool call, producing one tool message per returned content block.
    pub async fn call(&self, request: &ToolCallRequest) -> Result<Vec<Message>, ToolError> {
        if !self.is_allowed(&request.name) {
            warn!(tool = %request.name, "Rejected tool call outside the allow-list");
            return Ok(vec![Message::tool_result(
                &request.id,
                format!("Tool '{}' not allowed.", request.name),
            )]);
        }

        let Some(transport) = &self.transport else {
            return Err(ToolError::NotConfigured);
        };

        let arguments = decode_arguments(request)?;
        debug!(tool = %request.name, call_id = %request.id, "Calling tool");

        let mut session = transport.open().await?;
        let outcome = session.call_tool(&request.name, arguments).await;
        close(session.as_mut(), transport.name()).await;

        outcome?
            .into_iter()
            .map(|block| to_message(&request.id, block))
            .collect()
    }
}

async fn close(session: &mut dyn ToolSession, transport: &str) {
    if let Err(e) = session.close().await {
        warn!(transport, error = %e, "Failed to close tool session");
    }
}

/// Arguments arrive as the model's raw JSON text; an empty string means no arguments.
fn decode_arguments(request: &ToolCallRequest) -> Result<serde_json::Value, ToolError> {
    if request.arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    let value: serde_json::Value =
        serde_json::from_str(&request.arguments).map_err(|e| ToolError::InvalidArguments {
            tool_name: request.name.clone(),
            reason: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(ToolError::InvalidArguments {
            tool_name: request.name.clone(),
            reason: "arguments must be a JSON object".into(),
        });
    }
    Ok(value)
}

fn to_message(call_id: &str, block: ContentBlock) -> Result<Message, ToolError> {
    match block {
        ContentBlock::Text { text } => Ok(Message::tool_result(call_id, text)),
        ContentBlock::Resource {
            mime_type, text, ..
        } => {
            let mime = mime_type.unwrap_or_default();
            let base = mime.split(';').next().unwrap_or_default().trim();
            if base == TEXT_PLAIN {
                Ok(Message::tool_result(call_id, text.unwrap_or_default()))
            } else {
                Err(ToolError::UnsupportedContent {
                    mime_type: base.to_string(),
                })
            }
        }
        ContentBlock::Other { kind } => Err(ToolError::UnknownContent { kind }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A transport that counts sessions and replays fixed content.
    #[derive(Default)]
    struct CountingTransport {
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
        calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
        content: Vec<ContentBlock>,
        fail_call: bool,
        fail_close: bool,
    }

    impl CountingTransport {
        fn returning(content: Vec<ContentBlock>) -> Self {
            Self {
                content,
                ..Default::default()
            }
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct CountingSession {
        closed: Arc<AtomicUsize>,
        calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
        content: Vec<ContentBlock>,
        fail_call: bool,
        fail_close: bool,
    }

    #[async_trait]
    impl ToolTransport for CountingTransport {
        fn name(&self) -> &str {
            "counting"
        }

        async fn open(&self) -> Result<Box<dyn ToolSession>, ToolError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingSession {
                closed: self.closed.clone(),
                calls: self.calls.clone(),
                content: self.content.clone(),
                fail_call: self.fail_call,
                fail_close: self.fail_close,
            }))
        }
    }

    #[async_trait]
    impl ToolSession for CountingSession {
        async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, ToolError> {
            Ok(["search_products_tool", "create_order_tool", "delete_product_tool"]
                .into_iter()
                .map(|n| ToolDescriptor::new(n, "", serde_json::json!({"type": "object"})))
                .collect())
        }

        async fn call_tool(
            &mut self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<Vec<ContentBlock>, ToolError> {
            self.calls.lock().unwrap().push((name.to_string(), arguments));
            if self.fail_call {
                return Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: 30,
                });
            }
            Ok(self.content.clone())
        }

        async fn close(&mut self) -> Result<(), ToolError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ToolError::Transport("connection reset".into()));
            }
            Ok(())
        }
    }

    fn call(name: &str, args: &str) -> ToolCallRequest {
        ToolCallRequest::new("tc1", name, args)
    }

    #[tokio::test]
    async fn disallowed_tool_never_touches_transport() {
        let transport = Arc::new(CountingTransport::default());
        let gateway = ToolGateway::new(transport.clone()).with_allowed_tools(["search_products_tool"]);

        let messages = gateway.call(&call("delete_product_tool", "{}")).await.unwrap();
        assert_eq!(
            messages,
            vec![Message::tool_result("tc1", "Tool 'delete_product_tool' not allowed.")]
        );
        assert_eq!(transport.opened(), 0);
    }

    #[tokio::test]
    async fn empty_allow_list_allows_nothing() {
        let transport = Arc::new(CountingTransport::default());
        let gateway = ToolGateway::new(transport.clone()).with_allowed_tools(Vec::<String>::new());

        assert!(gateway.tools().await.unwrap().is_empty());
        let messages = gateway.call(&call("search_products_tool", "{}")).await.unwrap();
        assert!(messages[0].content().contains("not allowed"));
    }

    #[tokio::test]
    async fn catalog_is_filtered_and_session_closed() {
        let transport = Arc::new(CountingTransport::default());
        let gateway = ToolGateway::new(transport.clone())
            .with_allowed_tools(["search_products_tool", "create_order_tool", "not_listed"]);

        let names: Vec<String> = gateway.tools().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["search_products_tool", "create_order_tool"]);
        assert_eq!(transport.opened(), 1);
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test]
    async fn unrestricted_gateway_lists_everything() {
        let gateway = ToolGateway::new(Arc::new(CountingTransport::default()));
        assert_eq!(gateway.tools().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn disabled_gateway_has_no_tools_and_rejects_calls() {
        let gateway = ToolGateway::disabled();
        assert!(gateway.tools().await.unwrap().is_empty());
        let err = gateway.call(&call("search_products_tool", "{}")).await.unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured));
    }

    #[tokio::test]
    async fn text_and_plain_resources_become_tool_messages() {
        let transport = Arc::new(CountingTransport::returning(vec![
            ContentBlock::text("3 products"),
            ContentBlock::resource("file:///p.txt", "text/plain; charset=utf-8", "acetone 99%"),
        ]));
        let gateway = ToolGateway::new(transport.clone());

        let messages = gateway
            .call(&call("search_products_tool", r#"{"name":"acetone"}"#))
            .await
            .unwrap();
        assert_eq!(
            messages,
            vec![
                Message::tool_result("tc1", "3 products"),
                Message::tool_result("tc1", "acetone 99%"),
            ]
        );
        assert_eq!(
            transport.calls.lock().unwrap()[0],
            ("search_products_tool".to_string(), serde_json::json!({"name": "acetone"}))
        );
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test]
    async fn non_text_resource_is_unsupported() {
        let transport = Arc::new(CountingTransport::returning(vec![ContentBlock::resource(
            "file:///a.png",
            "image/png",
            "",
        )]));
        let gateway = ToolGateway::new(transport);
        let err = gateway.call(&call("x", "{}")).await.unwrap_err();
        assert!(matches!(err, ToolError::UnsupportedContent { ref mime_type } if mime_type == "image/png"));
    }

    #[tokio::test]
    async fn unknown_block_kind_is_rejected() {
        let transport = Arc::new(CountingTransport::returning(vec![ContentBlock::Other {
            kind: "audio".into(),
        }]));
        let gateway = ToolGateway::new(transport);
        let err = gateway.call(&call("x", "{}")).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown content type: audio");
    }

    #[tokio::test]
    async fn empty_arguments_mean_empty_object() {
        let transport = Arc::new(CountingTransport::returning(vec![ContentBlock::text("ok")]));
        let gateway = ToolGateway::new(transport.clone());
        gateway.call(&call("list_open_orders_tool", "  ")).await.unwrap();
        assert_eq!(transport.calls.lock().unwrap()[0].1, serde_json::json!({}));
    }

    #[tokio::test]
    async fn malformed_arguments_fail_before_opening_a_session() {
        let transport = Arc::new(CountingTransport::default());
        let gateway = ToolGateway::new(transport.clone());

        let err = gateway.call(&call("x", "{not json")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        let err = gateway.call(&call("x", "[1, 2]")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert_eq!(transport.opened(), 0);
    }

    #[tokio::test]
    async fn session_closed_when_call_fails() {
        let transport = Arc::new(CountingTransport {
            fail_call: true,
            ..Default::default()
        });
        let gateway = ToolGateway::new(transport.clone());
        let err = gateway.call(&call("search", "{}")).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test]
    async fn close_failure_is_not_raised() {
        let transport = Arc::new(CountingTransport {
            content: vec![ContentBlock::text("fine")],
            fail_close: true,
            ..Default::default()
        });
        let gateway = ToolGateway::new(transport.clone());
        let messages = gateway.call(&call("search", "{}")).await.unwrap();
        assert_eq!(messages[0].content(), "fine");
        assert_eq!(transport.closed(), 1);
    }
}
