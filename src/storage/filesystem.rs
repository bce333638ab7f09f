//! File System Storage
//!
//! Information Hiding:
//! - File paths and on-disk layout hidden from users
//! - Directory structure management hidden behind interface
//! - Persistence mechanism independent of storage trait users

use super::StorageBackend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;

static UNSAFE_KEY_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid key pattern"));

/// File system storage - each key is a JSON file
/// Files are stored as {base_path}/{key}.json
pub struct FileSystemStorage {
    base_path: PathBuf,
}

impl FileSystemStorage {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&base_path)
            .await
            .context(format!("Failed to create storage directory {:?}", base_path))?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file_stem = UNSAFE_KEY_CHARS.replace_all(key, "_");
        self.base_path.join(format!("{}.json", file_stem))
    }
}

#[async_trait]
impl StorageBackend for FileSystemStorage {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);

        if !fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!("[FileSystemStorage] Key '{}' does not exist", key);
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .await
            .context(format!("Failed to read storage file: {:?}", path))?;

        tracing::debug!("[FileSystemStorage] Read '{}' from {:?}", key, path);
        Ok(Some(json))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key);
        let staging = path.with_extension("json.tmp");

        fs::write(&staging, value)
            .await
            .context(format!("Failed to write storage file: {:?}", staging))?;
        fs::rename(&staging, &path)
            .await
            .context(format!("Failed to move {:?} into place", staging))?;

        tracing::debug!(
            "[FileSystemStorage] Wrote {} bytes for '{}' to {:?}",
            value.len(),
            key,
            path
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);

        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .context(format!("Failed to delete storage file: {:?}", path))?;
            tracing::debug!("[FileSystemStorage] Removed '{}' at {:?}", key, path);
        } else {
            tracing::debug!("[FileSystemStorage] Key '{}' does not exist, nothing to remove", key);
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .context("Failed to read storage directory")?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                fs::remove_file(&path)
                    .await
                    .context(format!("Failed to delete storage file: {:?}", path))?;
                removed += 1;
            }
        }

        tracing::debug!("[FileSystemStorage] Cleared {} keys", removed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}
