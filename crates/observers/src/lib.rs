//! Chat observers for chatscout.
//!
//! Each observer registers on a [`Chat`](chatscout_core::Chat) and sees every
//! appended message. None of them take part in the agent's control flow.
//! State lives behind a `Mutex`; observers built with a directory write
//! their state through to disk after every message.

pub mod analytics;
pub mod audit;
pub mod composite;
pub mod history;
pub mod rate_limit;
pub mod suite;
pub mod tool_trace;

pub use analytics::{AnalyticsObserver, AnalyticsSnapshot};
pub use audit::{AuditEntry, AuditEvent, AuditSink, AuditTrail, AuditVerifyError, TracingSink, verify_chain};
pub use composite::CompositeObserver;
pub use history::HistoryRecorder;
pub use rate_limit::{RateLimitPolicy, RateLimitStatus};
pub use suite::ObserverSuite;
pub use tool_trace::{ToolCallTrace, ToolStats, ToolTraceObserver};

use chatscout_core::error::ObserverError;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// File-name stamp shared by every observer of a session.
pub(crate) fn file_stamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub(crate) fn now_iso() -> String {
    chrono::Local::now().to_rfc3339()
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ObserverError> {
    mutex
        .lock()
        .map_err(|e| ObserverError::Poisoned(e.to_string()))
}

/// Overwrite `path` with pretty-printed JSON.
pub(crate) fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), ObserverError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
