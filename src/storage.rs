use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{CoordinatorError, Result};

/// Filesystem store for uploaded configuration snapshots and the objects
/// workers leave beside them.
///
/// A snapshot `name` lives at `{root}/{name}/{name}.zip`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store a new snapshot. An existing snapshot of the same name is never
    /// overwritten.
    pub async fn store_snapshot(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(CoordinatorError::InvalidName(name.to_string()));
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let dir = self.root.join(name);
        // create_dir fails on an existing directory, so only one upload wins.
        tokio::fs::create_dir(&dir).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => CoordinatorError::SnapshotExists(name.to_string()),
            _ => e.into(),
        })?;

        let path = dir.join(format!("{}.zip", name));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => CoordinatorError::SnapshotExists(name.to_string()),
                _ => e.into(),
            })?;
        file.write_all(bytes).await?;
        file.flush().await?;
        tracing::info!(snapshot = name, bytes = bytes.len(), "Snapshot stored");
        Ok(path)
    }

    /// Read an object by its path relative to the store root.
    pub async fn fetch_object(&self, object: &str) -> Result<Vec<u8>> {
        let relative = Path::new(object);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if object.is_empty() || !plain {
            return Err(CoordinatorError::InvalidName(object.to_string()));
        }

        let path = self.root.join(relative);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(tokio::fs::read(&path).await?),
            Ok(_) => Err(CoordinatorError::ObjectNotFound(object.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CoordinatorError::ObjectNotFound(object.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
