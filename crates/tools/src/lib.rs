//! Tool access for chatscout.
//!
//! The agent never talks to a tool backend directly. It goes through the
//! [`ToolGateway`], which enforces the allow-list and converts content blocks
//! into tool messages. Backends plug in behind [`ToolTransport`]: an
//! in-process [`ToolRegistry`](chatscout_core::ToolRegistry) or a remote MCP
//! server over streamable HTTP.

pub mod gateway;
pub mod local;
pub mod mcp_http;
pub mod transport;

pub use gateway::ToolGateway;
pub use local::RegistryTransport;
pub use mcp_http::StreamableHttpTransport;
pub use transport::{ToolSession, ToolTransport};
