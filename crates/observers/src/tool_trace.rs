//! Pairs each tool request with its result and times the round trip.

use chatscout_core::chat::ChatObserver;
use chatscout_core::error::ObserverError;
use chatscout_core::message::{Message, Role};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{file_stamp, lock, now_iso, preview, write_json};

const RESULT_PREVIEW_CHARS: usize = 500;

/// One tool call, from request to (optional) result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallTrace {
    pub call_id: String,
    pub function_name: String,
    /// Decoded arguments, or `{"raw": ...}` when they are not valid JSON
    pub arguments: Value,
    pub called_at: String,
    pub result: Option<Value>,
    pub completed_at: Option<String>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStats {
    pub total_calls: usize,
    pub by_function: BTreeMap<String, usize>,
    pub pending_calls: usize,
    pub avg_duration_ms: Option<u64>,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
}

#[derive(Default)]
struct TraceState {
    calls: Vec<ToolCallTrace>,
    /// call id -> (index into `calls`, request time)
    pending: HashMap<String, (usize, Instant)>,
}

pub struct ToolTraceObserver {
    session: String,
    started: String,
    path: Option<PathBuf>,
    state: Mutex<TraceState>,
}

impl ToolTraceObserver {
    /// Writes `tools_<session>_<YYYYmmdd_HHMMSS>.json` under `dir` when given.
    pub fn new(session: impl Into<String>, dir: Option<&Path>) -> Result<Self, ObserverError> {
        let session = session.into();
        let started = file_stamp();
        let path = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(dir.join(format!("tools_{session}_{started}.json")))
            }
            None => None,
        };

        let observer = Self {
            session,
            started,
            path,
            state: Mutex::new(TraceState::default()),
        };
        observer.save(&*lock(&observer.state)?)?;
        if let Some(path) = &observer.path {
            info!(path = %path.display(), "Tool trace observer initialized");
        }
        Ok(observer)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn calls(&self) -> Result<Vec<ToolCallTrace>, ObserverError> {
        Ok(lock(&self.state)?.calls.clone())
    }

    pub fn stats(&self) -> Result<ToolStats, ObserverError> {
        Ok(stats(&*lock(&self.state)?))
    }

    fn save(&self, state: &TraceState) -> Result<(), ObserverError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let doc = json!({
            "session": self.session,
            "started": self.started,
            "last_updated": now_iso(),
            "stats": stats(state),
            "calls": state.calls,
        });
        write_json(path, &doc)
    }
}

fn stats(state: &TraceState) -> ToolStats {
    let mut by_function: BTreeMap<String, usize> = BTreeMap::new();
    for call in &state.calls {
        *by_function.entry(call.function_name.clone()).or_default() += 1;
    }
    let durations: Vec<u64> = state.calls.iter().filter_map(|c| c.duration_ms).collect();
    let avg = (!durations.is_empty()).then(|| durations.iter().sum::<u64>() / durations.len() as u64);

    ToolStats {
        total_calls: state.calls.len(),
        by_function,
        pending_calls: state.pending.len(),
        avg_duration_ms: avg,
        min_duration_ms: durations.iter().min().copied(),
        max_duration_ms: durations.iter().max().copied(),
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "raw": raw }))
}

fn parse_result(content: &str) -> Value {
    if content.is_empty() {
        return json!({ "empty": true });
    }
    let length = content.chars().count();
    match serde_json::from_str::<Value>(content) {
        Ok(parsed) => json!({ "parsed": parsed, "length": length }),
        Err(_) => json!({
            "raw_preview": preview(content, RESULT_PREVIEW_CHARS),
            "length": length,
        }),
    }
}

impl ChatObserver for ToolTraceObserver {
    fn name(&self) -> &str {
        "tool_trace"
    }

    fn update(&self, message: &Message) -> Result<(), ObserverError> {
        let now = Instant::now();
        let mut state = lock(&self.state)?;

        for call in message.tool_calls() {
            let index = state.calls.len();
            state.calls.push(ToolCallTrace {
                call_id: call.id.clone(),
                function_name: call.name.clone(),
                arguments: parse_arguments(&call.arguments),
                called_at: now_iso(),
                result: None,
                completed_at: None,
                duration_ms: None,
            });
            state.pending.insert(call.id.clone(), (index, now));
        }

        if message.role() == Role::Tool {
            let id = message.tool_call_id().unwrap_or_default();
            match state.pending.remove(id) {
                Some((index, asked)) => {
                    let trace = &mut state.calls[index];
                    trace.result = Some(parse_result(message.content()));
                    trace.completed_at = Some(now_iso());
                    trace.duration_ms = Some((now - asked).as_millis() as u64);
                }
                None => debug!(call_id = id, "Tool result without a pending request"),
            }
        }

        self.save(&state)
    }
}
