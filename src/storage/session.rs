//! Session-scoped Storage
//!
//! Files live in a private scratch directory that is removed when the storage
//! is dropped, so nothing outlives the running session.

use super::filesystem::FileSystemStorage;
use super::StorageBackend;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct SessionStorage {
    inner: FileSystemStorage,
}

impl SessionStorage {
    /// Scratch directory under the system temp dir
    pub async fn new() -> Result<Self> {
        Self::within(std::env::temp_dir()).await
    }

    /// Scratch directory under `parent`
    pub async fn within(parent: impl AsRef<Path>) -> Result<Self> {
        let dir = parent
            .as_ref()
            .join(format!("chatkeep-session-{}", uuid::Uuid::new_v4()));
        let inner = FileSystemStorage::new(dir).await?;
        tracing::debug!("[SessionStorage] Session directory {:?}", inner.base_path());
        Ok(Self { inner })
    }

    pub fn dir(&self) -> PathBuf {
        self.inner.base_path().to_path_buf()
    }
}

impl Drop for SessionStorage {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(self.inner.base_path()) {
            tracing::warn!(
                "[SessionStorage] Could not remove {:?}: {}",
                self.inner.base_path(),
                e
            );
        }
    }
}

#[async_trait]
impl StorageBackend for SessionStorage {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.inner.write(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
