//! Durable checkpoint index.
//!
//! The whole index is rewritten on every mutation; there is no incremental
//! log.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use shieldbox_core::{Checkpoint, Error, Result};

/// Session id to its checkpoints, oldest first.
pub type CheckpointIndex = BTreeMap<String, Vec<Checkpoint>>;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the full index. A store that was never written is empty.
    async fn load(&self) -> Result<CheckpointIndex>;

    /// Replace the stored index.
    async fn save(&self, index: &CheckpointIndex) -> Result<()>;
}

/// Checkpoint index kept in a pretty-printed JSON file.
pub struct JsonFileCheckpointStore {
    path: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self) -> Result<CheckpointIndex> {
        if !self.path.exists() {
            return Ok(CheckpointIndex::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::storage(format!("Failed to read checkpoint index: {}", e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::storage(format!(
                "Failed to parse checkpoint index {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn save(&self, index: &CheckpointIndex) -> Result<()> {
        let content = serde_json::to_string_pretty(index).map_err(|e| {
            Error::storage(format!("Failed to serialize checkpoint index: {}", e))
        })?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::storage(format!("Failed to create checkpoint directory: {}", e))
            })?;
        }

        // Write then rename so a crash never leaves a truncated index.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| {
            Error::storage(format!("Failed to write checkpoint index: {}", e))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            Error::storage(format!("Failed to replace checkpoint index: {}", e))
        })?;
        Ok(())
    }
}

/// In-memory checkpoint store for tests.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    index: Mutex<CheckpointIndex>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<CheckpointIndex> {
        Ok(self.index.lock().await.clone())
    }

    async fn save(&self, index: &CheckpointIndex) -> Result<()> {
        *self.index.lock().await = index.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn checkpoint(id: &str, session: &str) -> Checkpoint {
        Checkpoint {
            id: id.into(),
            session_id: session.into(),
            image_id: format!("sha256:{}", id),
            description: "before refactor".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path().join("checkpoints.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/checkpoints.json");
        let store = JsonFileCheckpointStore::new(&path);

        let mut index = CheckpointIndex::new();
        index.insert(
            "s1".into(),
            vec![checkpoint("sb-cp-1", "s1"), checkpoint("sb-cp-2", "s1")],
        );
        store.save(&index).await.unwrap();

        let reopened = JsonFileCheckpointStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), index);
        assert!(!path.with_extension("json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_corrupt_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileCheckpointStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
