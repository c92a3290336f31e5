//! Local filesystem storage backend.
//!
//! Rows are JSON files under `{root}/{namespace}/{key}.json`. Writes go
//! through a temp file and rename so a crashed process never leaves a torn
//! cache entry behind.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::KeyValueStore;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a namespace/key pair.
    fn path(&self, namespace: &str, key: &str) -> PathBuf {
        self.root_dir
            .join(sanitize(namespace))
            .join(format!("{}.json", sanitize(key)))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Map a namespace or row key to a safe file name component.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(namespace, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn put(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path(namespace, key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.path(namespace, key)).await.is_ok())
    }
}
