//! # chatscout core
//!
//! Domain types, traits, and error definitions for the chatscout agent runtime.
//! This crate has no runtime dependencies: it defines the domain model that
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here. Implementations live in their respective
//! crates, so providers, tool transports and observers can be swapped via
//! configuration or replaced by hand-written mocks in tests.

pub mod agent;
pub mod chat;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, IntentConfig, RouterConfig};
pub use chat::{Chat, ChatObserver};
pub use error::{ChatError, Error, ObserverError, ProviderError, Result, ToolError};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{
    Choice, GenerateOptions, Provider, ProviderRequest, ProviderResponse, ResponseFormat,
    ToolDescriptor, Usage,
};
pub use tool::{ContentBlock, Tool, ToolRegistry};
