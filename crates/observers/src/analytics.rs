//! Session metrics: message counts, sizes, response times and tool usage.

use chatscout_core::chat::ChatObserver;
use chatscout_core::error::ObserverError;
use chatscout_core::message::{Message, Role};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::{file_stamp, lock, now_iso, write_json};

/// How many tool call records a snapshot carries.
const RECENT_TOOL_CALLS: usize = 10;

const ROLES: [Role; 4] = [Role::User, Role::Assistant, Role::System, Role::Tool];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseTimes {
    pub count: usize,
    pub avg_seconds: f64,
    pub min_seconds: f64,
    pub max_seconds: f64,
}

/// One tool request or tool result seen in the chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub timestamp: String,
    /// Set for requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Set for results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolUsage {
    pub total_calls: usize,
    /// The most recent records only
    pub calls: Vec<ToolCallRecord>,
}

/// A point-in-time view of the session metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_messages: usize,
    pub message_counts: BTreeMap<String, usize>,
    pub total_chars: BTreeMap<String, usize>,
    /// Roughly four characters per token
    pub estimated_tokens: BTreeMap<String, usize>,
    pub total_estimated_tokens: usize,
    pub response_times: ResponseTimes,
    pub tool_usage: ToolUsage,
    pub session_duration_seconds: f64,
}

struct AnalyticsState {
    counts: HashMap<Role, usize>,
    chars: HashMap<Role, usize>,
    response_times: Vec<f64>,
    pending_user: Option<Instant>,
    tool_calls: Vec<ToolCallRecord>,
}

pub struct AnalyticsObserver {
    session: String,
    started: String,
    start: Instant,
    path: Option<PathBuf>,
    state: Mutex<AnalyticsState>,
}

impl AnalyticsObserver {
    pub fn new(session: impl Into<String>, dir: Option<&Path>) -> Result<Self, ObserverError> {
        let session = session.into();
        let started = file_stamp();
        let path = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(dir.join(format!("analytics_{session}_{started}.json")))
            }
            None => None,
        };

        let observer = Self {
            session,
            started,
            start: Instant::now(),
            path,
            state: Mutex::new(AnalyticsState {
                counts: ROLES.iter().map(|r| (*r, 0)).collect(),
                chars: ROLES.iter().map(|r| (*r, 0)).collect(),
                response_times: Vec::new(),
                pending_user: None,
                tool_calls: Vec::new(),
            }),
        };
        observer.save(&*lock(&observer.state)?)?;
        if let Some(path) = &observer.path {
            info!(path = %path.display(), "Analytics observer initialized");
        }
        Ok(observer)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current metrics.
    pub fn summary(&self) -> Result<AnalyticsSnapshot, ObserverError> {
        Ok(self.snapshot(&*lock(&self.state)?))
    }

    fn snapshot(&self, state: &AnalyticsState) -> AnalyticsSnapshot {
        let by_name = |map: &HashMap<Role, usize>, f: fn(usize) -> usize| {
            map.iter()
                .map(|(role, n)| (role.as_str().to_string(), f(*n)))
                .collect::<BTreeMap<_, _>>()
        };
        let estimated_tokens = by_name(&state.chars, |c| c / 4);

        let times = &state.response_times;
        let response_times = if times.is_empty() {
            ResponseTimes {
                count: 0,
                avg_seconds: 0.0,
                min_seconds: 0.0,
                max_seconds: 0.0,
            }
        } else {
            ResponseTimes {
                count: times.len(),
                avg_seconds: round(times.iter().sum::<f64>() / times.len() as f64, 3),
                min_seconds: round(times.iter().copied().fold(f64::INFINITY, f64::min), 3),
                max_seconds: round(times.iter().copied().fold(0.0, f64::max), 3),
            }
        };

        let recent = state.tool_calls.len().saturating_sub(RECENT_TOOL_CALLS);
        AnalyticsSnapshot {
            total_messages: state.counts.values().sum(),
            message_counts: by_name(&state.counts, |n| n),
            total_chars: by_name(&state.chars, |n| n),
            total_estimated_tokens: estimated_tokens.values().sum(),
            estimated_tokens,
            response_times,
            tool_usage: ToolUsage {
                total_calls: state.tool_calls.len(),
                calls: state.tool_calls[recent..].to_vec(),
            },
            session_duration_seconds: round(self.start.elapsed().as_secs_f64(), 2),
        }
    }

    fn save(&self, state: &AnalyticsState) -> Result<(), ObserverError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let doc = json!({
            "session": self.session,
            "started": self.started,
            "last_updated": now_iso(),
            "metrics": self.snapshot(state),
        });
        write_json(path, &doc)
    }
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl ChatObserver for AnalyticsObserver {
    fn name(&self) -> &str {
        "analytics"
    }

    fn update(&self, message: &Message) -> Result<(), ObserverError> {
        let now = Instant::now();
        let role = message.role();
        let mut state = lock(&self.state)?;

        *state.counts.entry(role).or_default() += 1;
        *state.chars.entry(role).or_default() += message.content().chars().count();

        match role {
            Role::User => state.pending_user = Some(now),
            Role::Assistant => {
                if let Some(asked) = state.pending_user.take() {
                    state.response_times.push((now - asked).as_secs_f64());
                }
            }
            Role::Tool => {
                let record = ToolCallRecord {
                    timestamp: now_iso(),
                    tool_id: None,
                    function: None,
                    tool_call_id: message.tool_call_id().map(str::to_string),
                    output_length: Some(message.content().chars().count()),
                };
                state.tool_calls.push(record);
            }
            Role::System => {}
        }

        for call in message.tool_calls() {
            state.tool_calls.push(ToolCallRecord {
                timestamp: now_iso(),
                tool_id: Some(call.id.clone()),
                function: Some(call.name.clone()),
                tool_call_id: None,
                output_length: None,
            });
        }

        self.save(&state)
    }
}
