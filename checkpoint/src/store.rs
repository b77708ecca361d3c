//! Pluggable checkpoint persistence.
//!
//! The engine treats checkpoints as opaque once written — `CheckpointStore`
//! is the seam a boundary collaborator (the HTTP surface, a CLI, a test
//! harness) implements to choose where that opaque blob lives. Two
//! implementations ship here: [`InMemoryCheckpointStore`] for tests and
//! embedding, and [`FileCheckpointStore`] for the write-tmp-then-rename
//! on-disk layout the spec requires for every non-append file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{CheckpointError, Result};
use crate::state::CheckpointState;

/// Persistence backend for [`CheckpointState`], keyed by execution id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, execution_id: &str, state: &CheckpointState) -> Result<()>;
    async fn load(&self, execution_id: &str) -> Result<CheckpointState>;
    async fn try_load(&self, execution_id: &str) -> Result<Option<CheckpointState>> {
        match self.load(execution_id).await {
            Ok(state) => Ok(Some(state)),
            Err(CheckpointError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// In-memory checkpoint store. Useful for unit tests and for embedding
/// the engine in a process that keeps its own persistence layer.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, CheckpointState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, execution_id: &str, state: &CheckpointState) -> Result<()> {
        self.checkpoints
            .write()
            .map_err(|_| CheckpointError::Storage("in-memory checkpoint lock poisoned".into()))?
            .insert(execution_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<CheckpointState> {
        self.checkpoints
            .read()
            .map_err(|_| CheckpointError::Storage("in-memory checkpoint lock poisoned".into()))?
            .get(execution_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(execution_id.to_string()))
    }
}

/// File-backed checkpoint store. Each execution's checkpoint lives at
/// `{root}/{execution_id}/checkpoint.json`. Writes go to a sibling
/// `.tmp-{uuid}` file first and are renamed into place, so a reader never
/// observes a partially-written checkpoint — the crash-atomicity
/// requirement for every non-append persisted file.
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn checkpoint_path(&self, execution_id: &str) -> PathBuf {
        self.root.join(execution_id).join("checkpoint.json")
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            CheckpointError::Storage("checkpoint path has no parent directory".into())
        })?;
        fs::create_dir_all(dir).await?;

        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
        }
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, execution_id: &str, state: &CheckpointState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        Self::write_atomic(&self.checkpoint_path(execution_id), &bytes).await
    }

    async fn load(&self, execution_id: &str) -> Result<CheckpointState> {
        let path = self.checkpoint_path(execution_id);
        let bytes = fs::read(&path)
            .await
            .map_err(|_| CheckpointError::NotFound(execution_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = InMemoryCheckpointStore::new();
        let mut state = CheckpointState::new();
        state.variables.insert("workflow.input".into(), Value::from("hi"));

        store.save("exec-1", &state).await.unwrap();
        let loaded = store.load("exec-1").await.unwrap();
        assert_eq!(loaded.variables.get("workflow.input"), state.variables.get("workflow.input"));
    }

    #[tokio::test]
    async fn not_found_is_reported() {
        let store = InMemoryCheckpointStore::new();
        assert!(matches!(store.load("missing").await, Err(CheckpointError::NotFound(_))));
        assert_eq!(store.try_load("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_round_trip_with_atomic_rename() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let mut state = CheckpointState::new();
        state.node_outputs.insert("A".into(), Value::from("out"));

        store.save("exec-2", &state).await.unwrap();

        let path = dir.path().join("exec-2").join("checkpoint.json");
        assert!(path.exists());
        // no stray tmp files left behind
        let mut entries = tokio::fs::read_dir(dir.path().join("exec-2")).await.unwrap();
        let mut names = vec![];
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["checkpoint.json".to_string()]);

        let loaded = store.load("exec-2").await.unwrap();
        assert_eq!(loaded.node_outputs.get("A"), state.node_outputs.get("A"));
    }
}
