//! File-backed storage backend.
//!
//! The whole store lives in memory during the run and is loaded from, and
//! written back to, a single JSON document:
//!
//! ```json
//! {
//!   "100:7": { "state": "Form.age", "data": { "name": "Alice" } },
//!   "100:8": { "state": null, "data": {} }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::base::{Data, DataFactory, Storage};
use crate::error::{StorageError, StorageResult};
use crate::memory::{MemoryStorage, Record};

/// A [`MemoryStorage`] persisted to a JSON file.
///
/// All file access goes through `tokio::fs`, which runs on the blocking
/// pool, so loading and saving never stall the dispatch tasks.
#[derive(Debug)]
pub struct JsonStorage {
    path: PathBuf,
    memory: MemoryStorage,
}

impl JsonStorage {
    /// Creates a store backed by `path`. Nothing is read until `init`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            memory: MemoryStorage::new(),
        }
    }

    /// Creates a store with a custom data factory.
    pub fn with_factory(path: impl Into<PathBuf>, factory: DataFactory) -> Self {
        Self {
            path: path.into(),
            memory: MemoryStorage::with_factory(factory),
        }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current contents to disk without closing the store.
    pub async fn save(&self) -> StorageResult<()> {
        let snapshot = self.memory.snapshot();
        let document = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(&self.path, document).await?;
        debug!(path = %self.path.display(), records = snapshot.len(), "Saved storage file");
        Ok(())
    }

    async fn load(&self) -> StorageResult<()> {
        let raw = tokio::fs::read(&self.path).await?;
        let records: HashMap<String, Record> =
            serde_json::from_slice(&raw).map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        info!(path = %self.path.display(), records = records.len(), "Loaded storage file");
        self.memory.restore(records);
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn init(&self) -> StorageResult<()> {
        if !tokio::fs::try_exists(&self.path).await? {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.path, b"{}").await?;
            info!(path = %self.path.display(), "Created empty storage file");
        }
        self.load().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.save().await?;
        self.memory.close().await
    }

    async fn get_state(&self, key: &str) -> StorageResult<Option<String>> {
        self.memory.get_state(key).await
    }

    async fn set_state(&self, key: &str, state: Option<&str>) -> StorageResult<()> {
        self.memory.set_state(key, state).await
    }

    async fn get_data(&self, key: &str) -> StorageResult<Data> {
        self.memory.get_data(key).await
    }

    async fn set_data(&self, key: &str, data: Option<Data>) -> StorageResult<()> {
        self.memory.set_data(key, data).await
    }

    async fn update_data(&self, key: &str, partial: Data) -> StorageResult<()> {
        self.memory.update_data(key, partial).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_init_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fsm.json");
        let storage = JsonStorage::new(&path);

        storage.init().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert_eq!(storage.get_state("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_persists_and_init_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsm.json");

        let storage = JsonStorage::new(&path);
        storage.init().await.unwrap();
        storage.set_state("100:7", Some("Form.age")).await.unwrap();
        let mut data = Data::new();
        data.insert("name".into(), json!("Alice"));
        storage.update_data("100:7", data).await.unwrap();
        storage.close().await.unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            document,
            json!({"100:7": {"state": "Form.age", "data": {"name": "Alice"}}})
        );

        let reopened = JsonStorage::new(&path);
        reopened.init().await.unwrap();
        assert_eq!(
            reopened.get_state("100:7").await.unwrap().as_deref(),
            Some("Form.age")
        );
        assert_eq!(reopened.get_data("100:7").await.unwrap()["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsm.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let err = JsonStorage::new(&path).init().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
