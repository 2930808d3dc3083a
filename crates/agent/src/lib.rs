//! The tool-calling agent loop.
//!
//! 1. **Fetch** the tool catalog once per run
//! 2. **Send** the chat to the model backend
//! 3. **If tool calls**: dispatch them through the gateway, append results, loop back to step 2
//! 4. **Otherwise**: done
//!
//! The loop stops early at a configurable iteration ceiling.
//!
//! [`RoutedAgent`] puts several loops behind an [`IntentRouter`]: each user
//! message is classified and handled by that intent's agent and chat.

pub mod loop_runner;
pub mod routed;
pub mod router;

pub use loop_runner::{AgentError, AgentLoop};
pub use routed::{Route, Routed, RoutedAgent};
pub use router::IntentRouter;
