//! Persists every message of a session to one JSON file.

use chatscout_core::chat::ChatObserver;
use chatscout_core::error::ObserverError;
use chatscout_core::message::Message;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use crate::{file_stamp, lock, now_iso, write_json};

/// Records the session as `<session>_<YYYYmmdd_HHMMSS>.json`, rewritten after each message.
pub struct HistoryRecorder {
    session: String,
    started: String,
    path: Option<PathBuf>,
    state: Mutex<HistoryState>,
}

#[derive(Default)]
struct HistoryState {
    messages: Vec<Value>,
    ended: Option<String>,
}

impl HistoryRecorder {
    /// Creates the directory and an empty history file. With no directory the
    /// history is kept in memory only.
    pub fn new(session: impl Into<String>, dir: Option<&Path>) -> Result<Self, ObserverError> {
        let session = session.into();
        let started = file_stamp();
        let path = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(dir.join(format!("{session}_{started}.json")))
            }
            None => None,
        };

        let recorder = Self {
            session,
            started,
            path,
            state: Mutex::new(HistoryState::default()),
        };
        recorder.save(&*lock(&recorder.state)?)?;
        if let Some(path) = &recorder.path {
            info!(path = %path.display(), "Chat history recorder initialized");
        }
        Ok(recorder)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Recorded messages, each carrying its `timestamp`.
    pub fn entries(&self) -> Result<Vec<Value>, ObserverError> {
        Ok(lock(&self.state)?.messages.clone())
    }

    /// Stamp the session end and write the final state.
    pub fn finish(&self) -> Result<(), ObserverError> {
        let mut state = lock(&self.state)?;
        state.ended = Some(now_iso());
        self.save(&state)?;
        if let Some(path) = &self.path {
            info!(path = %path.display(), "Chat session ended");
        }
        Ok(())
    }

    fn document(&self, state: &HistoryState) -> Value {
        let mut doc = json!({
            "session": self.session,
            "started": self.started,
        });
        if let Some(ended) = &state.ended {
            doc["ended"] = json!(ended);
        }
        doc["messages"] = json!(state.messages);
        doc
    }

    fn save(&self, state: &HistoryState) -> Result<(), ObserverError> {
        match &self.path {
            Some(path) => write_json(path, &self.document(state)),
            None => Ok(()),
        }
    }
}

impl ChatObserver for HistoryRecorder {
    fn name(&self) -> &str {
        "history"
    }

    fn update(&self, message: &Message) -> Result<(), ObserverError> {
        let mut record = serde_json::to_value(message)?;
        record["timestamp"] = json!(now_iso());

        let mut state = lock(&self.state)?;
        state.messages.push(record);
        self.save(&state)
    }
}
