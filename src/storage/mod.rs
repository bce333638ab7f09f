//! Key/value Storage Abstraction
//!
//! Information Hiding:
//! - Storage medium hidden behind `StorageBackend`
//! - Backends report failures; `StorageAdapter` absorbs them so callers only
//!   ever see a no-op or an absent value
//! - Values are JSON text, timestamps as RFC 3339 strings

use crate::config::{StorageConfig, StorageKind};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub mod filesystem;
pub mod memory;
pub mod session;
pub mod sqlite;

use filesystem::FileSystemStorage;
use memory::InMemoryStorage;
use session::SessionStorage;
use sqlite::SqliteStorage;

/// Database file created inside the storage directory
pub const SQLITE_FILE: &str = "chatkeep.db";

/// Logical keys shared by the stores
pub mod keys {
    pub const CONVERSATIONS: &str = "conversations";
    pub const CURRENT_CONVERSATION_ID: &str = "current-conversation-id";
    pub const UI_STATE: &str = "ui-state";
    pub const THEME: &str = "theme";
    pub const LANGUAGE: &str = "language";
}

/// Raw storage medium
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns `None` if the key has never been written
    async fn read(&self, key: &str) -> Result<Option<String>>;

    async fn write(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Short label for log lines
    fn name(&self) -> &'static str;
}

/// Typed, never-failing facade over a `StorageBackend`
#[derive(Clone)]
pub struct StorageAdapter {
    backend: Arc<dyn StorageBackend>,
}

impl StorageAdapter {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStorage::new()))
    }

    /// Build the backing store named by `config`. A medium that cannot be
    /// opened degrades to in-memory storage.
    pub async fn open(config: &StorageConfig) -> Self {
        let opened: Result<Arc<dyn StorageBackend>> = match config.kind {
            StorageKind::Durable => FileSystemStorage::new(config.path.clone())
                .await
                .map(|s| Arc::new(s) as Arc<dyn StorageBackend>),
            StorageKind::Sqlite => SqliteStorage::open(config.path.join(SQLITE_FILE))
                .await
                .map(|s| Arc::new(s) as Arc<dyn StorageBackend>),
            StorageKind::Session => SessionStorage::new()
                .await
                .map(|s| Arc::new(s) as Arc<dyn StorageBackend>),
            StorageKind::Memory => Ok(Arc::new(InMemoryStorage::new())),
        };

        match opened {
            Ok(backend) => {
                tracing::info!("[StorageAdapter] Using {} storage", backend.name());
                Self::new(backend)
            }
            Err(e) => {
                tracing::warn!(
                    "[StorageAdapter] {:?} storage unavailable ({:#}), falling back to memory",
                    config.kind,
                    e
                );
                Self::in_memory()
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.read(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("[StorageAdapter] Read of '{}' failed: {:#}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[StorageAdapter] Discarding unreadable '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("[StorageAdapter] Could not serialize '{}': {}", key, e);
                return;
            }
        };

        if let Err(e) = self.backend.write(key, &raw).await {
            tracing::warn!("[StorageAdapter] Write of '{}' failed: {:#}", key, e);
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove(key).await {
            tracing::warn!("[StorageAdapter] Remove of '{}' failed: {:#}", key, e);
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            tracing::warn!("[StorageAdapter] Clear failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Conversation, Message};
    use chrono::Utc;
    use tempfile::TempDir;

    struct BrokenStorage;

    #[async_trait]
    impl StorageBackend for BrokenStorage {
        async fn read(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow::anyhow!("disabled by policy"))
        }

        async fn write(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow::anyhow!("disabled by policy"))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(anyhow::anyhow!("disabled by policy"))
        }

        async fn clear(&self) -> Result<()> {
            Err(anyhow::anyhow!("disabled by policy"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_unavailable_medium_degrades_silently() {
        let adapter = StorageAdapter::new(Arc::new(BrokenStorage));

        adapter.set(keys::THEME, "dark").await;
        assert_eq!(adapter.get::<String>(keys::THEME).await, None);
        adapter.remove(keys::THEME).await;
        adapter.clear().await;
    }

    #[tokio::test]
    async fn test_corrupt_value_reads_as_absent() {
        let backend = Arc::new(InMemoryStorage::new());
        backend.write(keys::CONVERSATIONS, "{not json").await.unwrap();

        let adapter = StorageAdapter::new(backend);
        assert!(adapter.get::<Vec<Conversation>>(keys::CONVERSATIONS).await.is_none());
    }

    #[tokio::test]
    async fn test_conversations_round_trip_losslessly() {
        let adapter = StorageAdapter::in_memory();
        let now = Utc::now();
        let mut conversation = Conversation::new("New Conversation", now);
        conversation.messages.push(Message::user("hi", now));
        conversation.messages.push(Message::assistant("hello", now));
        conversation.backend_id = Some("srv-1".to_string());

        adapter.set(keys::CONVERSATIONS, &vec![conversation.clone()]).await;
        let restored: Vec<Conversation> = adapter.get(keys::CONVERSATIONS).await.unwrap();

        assert_eq!(restored, vec![conversation]);
        assert_eq!(restored[0].messages[0].timestamp, now);
    }

    #[tokio::test]
    async fn test_open_falls_back_to_memory() {
        let dir = TempDir::new().unwrap();
        // A regular file where a directory is expected
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, "x").unwrap();

        let adapter = StorageAdapter::open(&StorageConfig {
            kind: StorageKind::Durable,
            path: blocker,
        })
        .await;

        assert_eq!(adapter.backend_name(), "memory");
        adapter.set(keys::LANGUAGE, "he").await;
        assert_eq!(adapter.get::<String>(keys::LANGUAGE).await.as_deref(), Some("he"));
    }

    #[tokio::test]
    async fn test_open_selects_requested_kind() {
        let dir = TempDir::new().unwrap();
        let durable = StorageAdapter::open(&StorageConfig {
            kind: StorageKind::Durable,
            path: dir.path().join("durable"),
        })
        .await;
        let sqlite = StorageAdapter::open(&StorageConfig {
            kind: StorageKind::Sqlite,
            path: dir.path().join("sqlite"),
        })
        .await;

        assert_eq!(durable.backend_name(), "filesystem");
        assert_eq!(sqlite.backend_name(), "sqlite");
    }
}
