//! In-memory storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::base::{Data, DataFactory, Storage};
use crate::error::StorageResult;

/// One subject's persisted record.
///
/// Serialized as `{ "state": string | null, "data": object }`, which is also
/// the per-key layout of the JSON file backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The current state name.
    #[serde(default)]
    pub state: Option<String>,
    /// Free-form data.
    #[serde(default)]
    pub data: Data,
}

/// A process-local map from key to [`Record`].
///
/// Records are created lazily on first touch. Every read hands out a deep
/// copy, so callers can never mutate stored data through an alias.
/// [`close`](Storage::close) clears the map; the backend is not meant to be
/// reused afterwards.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, Record>>,
    factory: DataFactory,
}

impl MemoryStorage {
    /// Creates an empty store with the default (empty map) data factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with a custom data factory.
    pub fn with_factory(factory: DataFactory) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Returns the data factory of this store.
    pub fn factory(&self) -> &DataFactory {
        &self.factory
    }

    /// Returns a copy of every record.
    pub fn snapshot(&self) -> HashMap<String, Record> {
        self.records.lock().clone()
    }

    /// Replaces every record.
    pub fn restore(&self, records: HashMap<String, Record>) {
        *self.records.lock() = records;
    }

    /// Returns the number of materialised records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if no record has been materialised.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Runs `f` on the record of `key`, creating it first if needed.
    fn with_record<R>(&self, key: &str, f: impl FnOnce(&mut Record) -> R) -> R {
        let mut records = self.records.lock();
        let record = records.entry(key.to_owned()).or_insert_with(|| Record {
            state: None,
            data: self.factory.make(),
        });
        f(record)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn close(&self) -> StorageResult<()> {
        self.records.lock().clear();
        Ok(())
    }

    async fn get_state(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.with_record(key, |r| r.state.clone()))
    }

    async fn set_state(&self, key: &str, state: Option<&str>) -> StorageResult<()> {
        self.with_record(key, |r| r.state = state.map(str::to_owned));
        Ok(())
    }

    async fn get_data(&self, key: &str) -> StorageResult<Data> {
        Ok(self.with_record(key, |r| r.data.clone()))
    }

    async fn set_data(&self, key: &str, data: Option<Data>) -> StorageResult<()> {
        let data = data.unwrap_or_else(|| self.factory.make());
        self.with_record(key, |r| r.data = data);
        Ok(())
    }

    async fn update_data(&self, key: &str, partial: Data) -> StorageResult<()> {
        self.with_record(key, |r| r.data.extend(partial));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> Data {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_unseen_key_defaults() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.get_state("1:1").await.unwrap(), None);
        assert!(storage.get_data("1:1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let storage = MemoryStorage::new();

        storage.set_state("k", Some("Form.name")).await.unwrap();
        assert_eq!(storage.get_state("k").await.unwrap().as_deref(), Some("Form.name"));

        storage.set_state("k", None).await.unwrap();
        assert_eq!(storage.get_state("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_is_shallow_merge() {
        let storage = MemoryStorage::new();

        storage
            .set_data("k", Some(data(json!({"a": {"x": 1}, "b": 1}))))
            .await
            .unwrap();
        storage
            .update_data("k", data(json!({"a": {"y": 2}, "c": 3})))
            .await
            .unwrap();

        assert_eq!(
            serde_json::Value::Object(storage.get_data("k").await.unwrap()),
            json!({"a": {"y": 2}, "b": 1, "c": 3})
        );
    }

    #[tokio::test]
    async fn test_get_data_returns_independent_copy() {
        let storage = MemoryStorage::new();
        storage.update_data("k", data(json!({"list": [1]}))).await.unwrap();

        let mut copy = storage.get_data("k").await.unwrap();
        copy.insert("list".into(), json!([1, 2, 3]));

        assert_eq!(storage.get_data("k").await.unwrap()["list"], json!([1]));
    }

    #[tokio::test]
    async fn test_set_data_none_uses_factory() {
        let storage =
            MemoryStorage::with_factory(DataFactory::new(|| data(json!({"lang": "en"}))));

        storage.update_data("k", data(json!({"x": 1}))).await.unwrap();
        storage.set_data("k", None).await.unwrap();

        assert_eq!(
            serde_json::Value::Object(storage.get_data("k").await.unwrap()),
            json!({"lang": "en"})
        );
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let storage = MemoryStorage::new();

        storage.reset("k").await.unwrap();
        storage.reset("k").await.unwrap();

        assert_eq!(storage.get_state("k").await.unwrap(), None);
        assert!(storage.get_data("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_clears() {
        let storage = MemoryStorage::new();
        storage.set_state("k", Some("s")).await.unwrap();
        assert_eq!(storage.len(), 1);

        storage.close().await.unwrap();
        assert!(storage.is_empty());
    }
}
