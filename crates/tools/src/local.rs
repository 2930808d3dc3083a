//! In-process transport over an explicit [`ToolRegistry`].

use async_trait::async_trait;
use chatscout_core::error::ToolError;
use chatscout_core::provider::ToolDescriptor;
use chatscout_core::tool::{ContentBlock, ToolRegistry};
use std::sync::Arc;

use crate::transport::{ToolSession, ToolTransport};

/// Serves the tools of a registry built at start-up.
#[derive(Clone)]
pub struct RegistryTransport {
    registry: Arc<ToolRegistry>,
}

impl RegistryTransport {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolTransport for RegistryTransport {
    fn name(&self) -> &str {
        "registry"
    }

    async fn open(&self) -> Result<Box<dyn ToolSession>, ToolError> {
        Ok(Box::new(RegistrySession {
            registry: self.registry.clone(),
            closed: false,
        }))
    }
}

struct RegistrySession {
    registry: Arc<ToolRegistry>,
    closed: bool,
}

impl RegistrySession {
    fn ensure_open(&self) -> Result<(), ToolError> {
        if self.closed {
            return Err(ToolError::Transport("session already closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ToolSession for RegistrySession {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, ToolError> {
        self.ensure_open()?;
        Ok(self.registry.descriptors())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        self.ensure_open()?;
        self.registry.execute(name, arguments).await
    }

    async fn close(&mut self) -> Result<(), ToolError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatscout_core::Tool;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Upper-cases text"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<Vec<ContentBlock>, ToolError> {
            let text = arguments["text"].as_str().unwrap_or_default();
            Ok(vec![ContentBlock::text(text.to_uppercase())])
        }
    }

    fn transport() -> RegistryTransport {
        RegistryTransport::new(Arc::new(ToolRegistry::new().with_tool(Arc::new(Upper))))
    }

    #[tokio::test]
    async fn lists_and_calls_registered_tools() {
        let mut session = transport().open().await.unwrap();
        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "upper");

        let out = session
            .call_tool("upper", serde_json::json!({"text": "acetone"}))
            .await
            .unwrap();
        assert_eq!(out, vec![ContentBlock::text("ACETONE")]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn closed_session_rejects_calls() {
        let mut session = transport().open().await.unwrap();
        session.close().await.unwrap();
        let err = session.list_tools().await.unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let mut session = transport().open().await.unwrap();
        let err = session
            .call_tool("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref n) if n == "missing"));
    }
}
