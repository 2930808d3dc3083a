//! The narrow interface the gateway speaks to a tool backend.
//!
//! A transport opens sessions; a session lists and calls tools and must be
//! closed by whoever opened it.

use async_trait::async_trait;
use chatscout_core::error::ToolError;
use chatscout_core::provider::ToolDescriptor;
use chatscout_core::tool::ContentBlock;

/// Opens sessions against a tool backend.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Short label used in logs (e.g. "registry", "mcp-http").
    fn name(&self) -> &str;

    async fn open(&self) -> Result<Box<dyn ToolSession>, ToolError>;
}

/// One live conversation with a tool backend.
#[async_trait]
pub trait ToolSession: Send {
    /// The full tool catalog.
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, ToolError>;

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<Vec<ContentBlock>, ToolError>;

    /// Release the session. Further calls are errors.
    async fn close(&mut self) -> Result<(), ToolError>;
}
