//! Chat persistence sink.
//!
//! When a backend hits its quota the chat so far is written out so the
//! conversation can be resumed later (`chatscout resume <file>`).

use chatscout_core::Chat;
use chatscout_core::error::ChatError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Errors raised while persisting a chat.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create chat store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write chat to {path}: {source}")]
    Write { path: PathBuf, source: ChatError },
}

/// Somewhere a chat can be saved, tagged with the model and a reason.
pub trait ChatStore: Send + Sync {
    fn persist(&self, chat: &Chat, model: &str, reason: &str) -> Result<PathBuf, StoreError>;
}

/// Writes each chat to `<unix-seconds>_<model>_<reason>.json` in one directory.
///
/// `/` in model names becomes `-`. The directory is created on first use.
#[derive(Debug, Clone)]
pub struct DirectoryChatStore {
    dir: PathBuf,
}

impl DirectoryChatStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(model: &str, reason: &str) -> String {
        format!(
            "{}_{}_{}.json",
            chrono::Utc::now().timestamp(),
            model.replace('/', "-"),
            reason
        )
    }
}

impl ChatStore for DirectoryChatStore {
    fn persist(&self, chat: &Chat, model: &str, reason: &str) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(Self::file_name(model, reason));
        let write = || -> Result<(), ChatError> {
            let file = std::fs::File::create(&path)?;
            chat.save(std::io::BufWriter::new(file))
        };
        write().map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), model, reason, "Saved chat history for retry");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatscout_core::Message;

    #[test]
    fn persists_under_model_and_reason() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryChatStore::new(dir.path().join("nested/chats"));
        let chat = Chat::with_messages([Message::user("Find acetone")]);

        let path = store.persist(&chat, "google/gemini-2.5-pro", "rate-limit").unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_google-gemini-2.5-pro_rate-limit.json"));
        let stamp: i64 = name.split('_').next().unwrap().parse().unwrap();
        assert!(stamp > 0);

        let restored = Chat::load(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(restored.messages(), chat.messages());
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let store = DirectoryChatStore::new(blocker.join("sub"));
        let err = store
            .persist(&Chat::new(), "m", "rate-limit")
            .unwrap_err();
        assert!(matches!(err, StoreError::CreateDir { .. }));
    }
}
