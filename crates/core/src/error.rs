//! Error types for the chatscout domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` wraps them all.

use std::time::Duration;
use thiserror::Error;

/// The top-level error type for all chatscout operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Chat log errors ---
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    // --- Observer errors ---
    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The remote signalled a rate or quota limit. This is the only kind the
    /// backend recovery protocol intercepts.
    #[error("Rate limited by provider: {message}{}", fmt_retry_after(.retry_after))]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {:.2}s)", d.as_secs_f64()),
        None => String::new(),
    }
}

impl ProviderError {
    /// Whether this is a resource-exhaustion (rate/quota) failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// The retry-after hint carried by an exhaustion error, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("No tool backend configured")]
    NotConfigured,

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool transport error: {0}")]
    Transport(String),

    #[error("Tool protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported MIME type: {mime_type}")]
    UnsupportedContent { mime_type: String },

    #[error("Unknown content type: {kind}")]
    UnknownContent { kind: String },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Invalid message role: {0}")]
    InvalidRole(String),

    #[error("Malformed chat record {index}: {reason}")]
    Malformed { index: usize, reason: String },

    #[error("Chat I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Observer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Observer serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Observer state poisoned: {0}")]
    Poisoned(String),

    #[error("Observer rejected input: {0}")]
    Rejected(String),
}
