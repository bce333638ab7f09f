//! SQLite Storage
//!
//! Information Hiding:
//! - Table layout and connection handling hidden behind the backend trait
//! - Blocking rusqlite calls run on the blocking pool

use super::StorageBackend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Durable key/value table in a single SQLite file
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub async fn open(path: PathBuf) -> Result<Self> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create database directory {:?}", parent))?;
            }
            let conn = Connection::open(&path)
                .context(format!("Failed to open database {:?}", path))?;
            Self::init(&conn)?;
            Ok(conn)
        })
        .await
        .context("Database open task panicked")??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create database")?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .context("Failed to create kv table")?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))?;
            op(&guard)
        })
        .await
        .context("Database task panicked")?
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .context("Failed to read key")
        })
        .await
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let bytes = value.len();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .context("Failed to write key")?;
            tracing::debug!("[SqliteStorage] Wrote {} bytes for '{}'", bytes, key);
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .context("Failed to delete key")?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM kv", [])
                .context("Failed to clear table")?;
            tracing::debug!("[SqliteStorage] Cleared {} keys", removed);
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_overwrite_and_read() {
        let storage = SqliteStorage::open_in_memory().unwrap();

        storage.write("theme", "\"light\"").await.unwrap();
        storage.write("theme", "\"dark\"").await.unwrap();
        assert_eq!(storage.read("theme").await.unwrap().as_deref(), Some("\"dark\""));
        assert_eq!(storage.read("language").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.write("a", "1").await.unwrap();
        storage.write("b", "2").await.unwrap();

        storage.remove("a").await.unwrap();
        assert_eq!(storage.read("a").await.unwrap(), None);

        storage.clear().await.unwrap();
        assert_eq!(storage.read("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("chat.db");

        {
            let storage = SqliteStorage::open(path.clone()).await.unwrap();
            storage.write("current-conversation-id", "\"c1\"").await.unwrap();
        }

        let storage = SqliteStorage::open(path).await.unwrap();
        assert_eq!(
            storage.read("current-conversation-id").await.unwrap().as_deref(),
            Some("\"c1\"")
        );
    }
}
