//! Tamper-evident audit trail.
//!
//! Append-only JSONL, one entry per line. Each entry carries
//! `hash = sha256(previous_hash + canonical_json(entry))`, truncated to 16 hex
//! characters, where the canonical form has sorted keys and excludes `hash`
//! itself. Editing, dropping or reordering a line breaks the chain from that
//! point on; [`verify_chain`] reports the first broken entry.

use chatscout_core::chat::ChatObserver;
use chatscout_core::error::ObserverError;
use chatscout_core::message::{Message, Role};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::{file_stamp, lock, now_iso, preview};

const PREVIEW_CHARS: usize = 200;
const HASH_LEN: usize = 16;
/// Entry fields that event details may not shadow.
const RESERVED_KEYS: [&str; 6] = [
    "entry_id",
    "timestamp",
    "session_id",
    "user_id",
    "event_type",
    "hash",
];

/// Types of audited events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    SessionStart,
    UserInput,
    AssistantResponse,
    AssistantToolRequest,
    ToolExecution,
    SystemMessage,
    SessionEnd,
    /// Application-defined event
    Custom(String),
}

impl AuditEvent {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionStart => "SESSION_START",
            Self::UserInput => "USER_INPUT",
            Self::AssistantResponse => "ASSISTANT_RESPONSE",
            Self::AssistantToolRequest => "ASSISTANT_TOOL_REQUEST",
            Self::ToolExecution => "TOOL_EXECUTION",
            Self::SystemMessage => "SYSTEM_MESSAGE",
            Self::SessionEnd => "SESSION_END",
            Self::Custom(name) => name,
        }
    }

    fn for_message(message: &Message) -> Self {
        match message.role() {
            Role::User => Self::UserInput,
            Role::Assistant if message.has_tool_calls() => Self::AssistantToolRequest,
            Role::Assistant => Self::AssistantResponse,
            Role::Tool => Self::ToolExecution,
            Role::System => Self::SystemMessage,
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit log entry, as written to one line of the trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: u64,
    pub timestamp: String,
    pub session_id: String,
    pub user_id: String,
    pub event_type: String,
    /// Event-specific fields, flattened into the entry
    #[serde(flatten)]
    pub details: Map<String, Value>,
    pub hash: String,
}

/// Trait for audit sinks (where entries are forwarded after being written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            entry_id = entry.entry_id,
            session_id = %entry.session_id,
            user_id = %entry.user_id,
            event = %entry.event_type,
            hash = %entry.hash,
            "AUDIT"
        );
    }
}

struct ChainState {
    entry_count: u64,
    previous_hash: Option<String>,
}

pub struct AuditTrail {
    session_id: String,
    user_id: String,
    path: Option<PathBuf>,
    sinks: Vec<Box<dyn AuditSink>>,
    state: Mutex<ChainState>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("session_id", &self.session_id)
            .field("path", &self.path)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl AuditTrail {
    /// Opens `audit_<session_id>_<YYYYmmdd_HHMMSS>.jsonl` and writes `SESSION_START`.
    /// A fresh 8-character session id is generated when none is given.
    pub fn new(
        user_id: impl Into<String>,
        session_id: Option<String>,
        dir: Option<&Path>,
    ) -> Result<Self, ObserverError> {
        Self::with_sinks(user_id, session_id, dir, Vec::new())
    }

    pub fn with_sinks(
        user_id: impl Into<String>,
        session_id: Option<String>,
        dir: Option<&Path>,
        sinks: Vec<Box<dyn AuditSink>>,
    ) -> Result<Self, ObserverError> {
        let session_id = session_id.unwrap_or_else(generate_session_id);
        let path = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(dir.join(format!("audit_{session_id}_{}.jsonl", file_stamp())))
            }
            None => None,
        };

        let trail = Self {
            session_id,
            user_id: user_id.into(),
            path,
            sinks,
            state: Mutex::new(ChainState {
                entry_count: 0,
                previous_hash: None,
            }),
        };
        trail.write(AuditEvent::SessionStart, Map::new())?;
        if let Some(path) = &trail.path {
            info!(path = %path.display(), session_id = %trail.session_id, "Audit trail initialized");
        }
        Ok(trail)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entries written so far.
    pub fn entry_count(&self) -> Result<u64, ObserverError> {
        Ok(lock(&self.state)?.entry_count)
    }

    /// Append an application-defined event.
    ///
    /// Details may not use the entry's own field names.
    pub fn log_event(
        &self,
        event_type: impl Into<String>,
        details: Map<String, Value>,
    ) -> Result<AuditEntry, ObserverError> {
        if let Some(key) = RESERVED_KEYS.iter().find(|k| details.contains_key(**k)) {
            return Err(ObserverError::Rejected(format!(
                "audit detail '{key}' shadows an entry field"
            )));
        }
        self.write(AuditEvent::Custom(event_type.into()), details)
    }

    /// Append `SESSION_END` with the given reason.
    pub fn finish(&self, reason: &str) -> Result<AuditEntry, ObserverError> {
        let total = self.entry_count()?;
        let mut details = Map::new();
        details.insert("reason".into(), json!(reason));
        details.insert("total_entries".into(), json!(total));
        let entry = self.write(AuditEvent::SessionEnd, details)?;
        if let Some(path) = &self.path {
            info!(path = %path.display(), "Audit session ended");
        }
        Ok(entry)
    }

    /// Chain, persist and forward one entry. The chain only advances once the
    /// line is on disk.
    fn write(
        &self,
        event: AuditEvent,
        details: Map<String, Value>,
    ) -> Result<AuditEntry, ObserverError> {
        let mut state = lock(&self.state)?;

        let mut entry = AuditEntry {
            entry_id: state.entry_count + 1,
            timestamp: now_iso(),
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            event_type: event.as_str().to_string(),
            details,
            hash: String::new(),
        };
        let mut unhashed = serde_json::to_value(&entry)?;
        strip_hash(&mut unhashed);
        entry.hash = chain_hash(state.previous_hash.as_deref(), &unhashed);

        if let Some(path) = &self.path {
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(line.as_bytes())?;
        }

        state.entry_count = entry.entry_id;
        state.previous_hash = Some(entry.hash.clone());
        drop(state);

        for sink in &self.sinks {
            sink.record(&entry);
        }
        Ok(entry)
    }
}

impl ChatObserver for AuditTrail {
    fn name(&self) -> &str {
        "audit"
    }

    fn update(&self, message: &Message) -> Result<(), ObserverError> {
        let content = message.content();
        let mut details = Map::new();
        details.insert("role".into(), json!(message.role().as_str()));
        details.insert("content_length".into(), json!(content.chars().count()));
        details.insert("content_preview".into(), json!(preview(content, PREVIEW_CHARS)));

        if let Some(id) = message.tool_call_id() {
            details.insert("tool_call_id".into(), json!(id));
        }
        if message.has_tool_calls() {
            let calls: Vec<Value> = message
                .tool_calls()
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "function": c.name,
                        "arguments_preview": preview(&c.arguments, PREVIEW_CHARS),
                    })
                })
                .collect();
            details.insert("tool_calls".into(), Value::Array(calls));
        }

        self.write(AuditEvent::for_message(message), details)?;
        Ok(())
    }
}

fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

fn strip_hash(value: &mut Value) {
    if let Value::Object(map) = value {
        map.remove("hash");
    }
}

fn chain_hash(previous: Option<&str>, entry: &Value) -> String {
    let mut hasher = Sha256::new();
    if let Some(previous) = previous {
        hasher.update(previous.as_bytes());
    }
    hasher.update(canonical_json(entry).as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..HASH_LEN].to_string()
}

/// Compact JSON with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum AuditVerifyError {
    #[error("Failed to read audit trail {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed audit entry on line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Audit chain broken at entry {entry_id} (line {line}): expected hash {expected}, found {found}")]
    Tampered {
        line: usize,
        entry_id: u64,
        expected: String,
        found: String,
    },
}

/// Re-derive every hash in the trail at `path`. Returns the number of
/// verified entries, or the first entry whose hash does not match.
pub fn verify_chain(path: &Path) -> Result<usize, AuditVerifyError> {
    let io_err = |source| AuditVerifyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;

    let mut previous: Option<String> = None;
    let mut verified = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }

        let mut value: Value =
            serde_json::from_str(&line).map_err(|e| AuditVerifyError::Malformed {
                line: line_no,
                reason: e.to_string(),
            })?;
        let found = value
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AuditVerifyError::Malformed {
                line: line_no,
                reason: "missing hash".into(),
            })?;
        let entry_id = value.get("entry_id").and_then(Value::as_u64).unwrap_or(0);

        strip_hash(&mut value);
        let expected = chain_hash(previous.as_deref(), &value);
        if expected != found {
            return Err(AuditVerifyError::Tampered {
                line: line_no,
                entry_id,
                expected,
                found,
            });
        }
        previous = Some(found);
        verified += 1;
    }
    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatscout_core::message::ToolCallRequest;
    use std::sync::Arc;

    fn trail(dir: &Path) -> AuditTrail {
        AuditTrail::new("tester", Some("ABCD1234".into()), Some(dir)).unwrap()
    }

    fn lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn session_start_is_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path());

        let name = trail.path().unwrap().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("audit_ABCD1234_"));
        assert!(name.ends_with(".jsonl"));

        let entries = lines(trail.path().unwrap());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["event_type"], "SESSION_START");
        assert_eq!(entries[0]["entry_id"], 1);
        assert_eq!(entries[0]["user_id"], "tester");
        assert_eq!(entries[0]["hash"].as_str().unwrap().len(), 16);
    }

    #[test]
    fn messages_map_to_event_types() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path());

        trail.update(&Message::system("be brief")).unwrap();
        trail.update(&Message::user("find acetone")).unwrap();
        trail
            .update(&Message::assistant_with_tools(
                None,
                vec![ToolCallRequest::new("tc1", "search", r#"{"name":"acetone"}"#)],
            ))
            .unwrap();
        trail.update(&Message::tool_result("tc1", "found")).unwrap();
        trail.update(&Message::assistant("done")).unwrap();

        let entries = lines(trail.path().unwrap());
        let kinds: Vec<&str> = entries.iter().map(|e| e["event_type"].as_str().unwrap()).collect();
        assert_eq!(
            kinds,
            vec![
                "SESSION_START",
                "SYSTEM_MESSAGE",
                "USER_INPUT",
                "ASSISTANT_TOOL_REQUEST",
                "TOOL_EXECUTION",
                "ASSISTANT_RESPONSE",
            ]
        );
        assert_eq!(entries[3]["tool_calls"][0]["function"], "search");
        assert_eq!(entries[4]["tool_call_id"], "tc1");
        assert_eq!(entries[2]["content_length"], 12);
    }

    #[test]
    fn long_content_is_previewed() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::new("u", None, Some(dir.path())).unwrap();
        trail.update(&Message::user("x".repeat(500))).unwrap();

        let entries = lines(trail.path().unwrap());
        let preview = entries[1]["content_preview"].as_str().unwrap();
        assert_eq!(preview.len(), 203);
        assert!(preview.ends_with("..."));
        assert_eq!(entries[1]["content_length"], 500);
        assert_eq!(trail.session_id().len(), 8);
        assert_eq!(trail.entry_count().unwrap(), 2);
    }

    #[test]
    fn intact_chain_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path());
        trail.update(&Message::user("hello")).unwrap();
        trail.log_event("EXPORT", Map::from_iter([("format".to_string(), json!("csv"))])).unwrap();
        let end = trail.finish("normal").unwrap();

        assert_eq!(end.details["total_entries"], 3);
        assert_eq!(verify_chain(trail.path().unwrap()).unwrap(), 4);
    }

    #[test]
    fn details_cannot_shadow_entry_fields() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path());
        for key in ["hash", "entry_id", "event_type"] {
            let details = Map::from_iter([(key.to_string(), json!("forged"))]);
            let err = trail.log_event("EXPORT", details).unwrap_err();
            assert!(matches!(err, ObserverError::Rejected(ref m) if m.contains(key)));
        }

        assert_eq!(trail.entry_count().unwrap(), 1);
        assert_eq!(verify_chain(trail.path().unwrap()).unwrap(), 1);
    }

    #[test]
    fn modified_line_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path());
        trail.update(&Message::user("order 5 drums")).unwrap();
        trail.update(&Message::assistant("ok")).unwrap();
        let path = trail.path().unwrap().to_path_buf();

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("order 5 drums", "order 50 drums");
        std::fs::write(&path, tampered).unwrap();

        match verify_chain(&path).unwrap_err() {
            AuditVerifyError::Tampered { entry_id, line, .. } => {
                assert_eq!(entry_id, 2);
                assert_eq!(line, 2);
            }
            other => panic!("expected tampering, got {other}"),
        }
    }

    #[test]
    fn dropped_line_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let trail = trail(dir.path());
        trail.update(&Message::user("a")).unwrap();
        trail.update(&Message::user("b")).unwrap();
        let path = trail.path().unwrap().to_path_buf();

        let kept: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| format!("{l}\n"))
            .collect();
        std::fs::write(&path, kept.concat()).unwrap();

        assert!(matches!(
            verify_chain(&path),
            Err(AuditVerifyError::Tampered { entry_id: 3, .. })
        ));
    }

    #[test]
    fn garbage_line_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(matches!(
            verify_chain(&path),
            Err(AuditVerifyError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn sinks_receive_entries() {
        struct Collect(Arc<Mutex<Vec<String>>>);
        impl AuditSink for Collect {
            fn record(&self, entry: &AuditEntry) {
                self.0.lock().unwrap().push(entry.event_type.clone());
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let trail = AuditTrail::with_sinks(
            "u",
            None,
            None,
            vec![Box::new(Collect(seen.clone())), Box::new(TracingSink)],
        )
        .unwrap();
        trail.update(&Message::user("hi")).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["SESSION_START", "USER_INPUT"]);
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [true, null], "c": "x"}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":"x","d":[true,null]},"b":1}"#);
    }
}
