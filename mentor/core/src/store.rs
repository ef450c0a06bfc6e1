//! History Persistence
//!
//! The whole conversation is stored under one key and replaced on every
//! write; there is no append log. Read and write failures are reported to
//! the caller, which is expected to log them and carry on with in-memory
//! state.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::message::ChatMessage;

/// Errors from a history store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("history I/O failed at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Stored history is not valid JSON
    #[error("stored history is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable storage for one conversation history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the stored history, `None` when nothing was stored
    async fn load(&self) -> Result<Option<Vec<ChatMessage>>, StoreError>;

    /// Replace the stored history
    async fn save(&self, messages: &[ChatMessage]) -> Result<(), StoreError>;

    /// Remove the stored history
    async fn clear(&self) -> Result<(), StoreError>;
}

/// History stored as a JSON file named after its namespace
#[derive(Clone, Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    /// Store `<dir>/<namespace>.json`
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{namespace}.json")),
        }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self) -> Result<Option<Vec<ChatMessage>>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, messages: &[ChatMessage]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec(messages)?;
        // Readers see the old history or the new one, never half of either
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// History kept in memory only
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    messages: Mutex<Option<Vec<ChatMessage>>>,
}

impl MemoryHistoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a history
    #[must_use]
    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Mutex::new(Some(messages)),
        }
    }

    /// Copy of what is currently stored
    #[must_use]
    pub fn stored(&self) -> Option<Vec<ChatMessage>> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self) -> Result<Option<Vec<ChatMessage>>, StoreError> {
        Ok(self.stored())
    }

    async fn save(&self, messages: &[ChatMessage]) -> Result<(), StoreError> {
        *self.messages.lock() = Some(messages.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.messages.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::welcome("Hi"),
            ChatMessage::user("What about nursing?"),
        ]
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path().join("nested"), "chat_history_v1");
        assert!(store.path().ends_with("nested/chat_history_v1.json"));

        assert!(store.load().await.unwrap().is_none());

        let messages = history();
        store.save(&messages).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(messages));

        // Replace, not append
        let shorter = vec![ChatMessage::welcome("Hi")];
        store.save(&shorter).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(shorter));
    }

    #[tokio::test]
    async fn test_file_store_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path(), "chat");

        store.clear().await.unwrap();
        store.save(&history()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path(), "chat");
        tokio::fs::write(store.path(), b"{ not a history")
            .await
            .unwrap();

        assert!(matches!(store.load().await, Err(StoreError::Format(_))));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryHistoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        let messages = history();
        store.save(&messages).await.unwrap();
        assert_eq!(store.stored(), Some(messages));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
