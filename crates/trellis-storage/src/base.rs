//! The storage contract.
//!
//! Every backend maps an opaque composite key to a `(state, data)` pair.
//! Backends implement the four primitives plus the `init`/`close` lifecycle;
//! the reset helpers are defined once here on top of `set_state`/`set_data`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageResult;

/// Free-form data attached to a conversational subject.
pub type Data = Map<String, Value>;

/// Produces the default data for subjects that have none.
///
/// Unseen keys and `set_data(key, None)` both resolve to a fresh value from
/// this factory, never to `null`.
#[derive(Clone)]
pub struct DataFactory(Arc<dyn Fn() -> Data + Send + Sync>);

impl DataFactory {
    /// Creates a factory from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Data + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Produces a fresh default value.
    pub fn make(&self) -> Data {
        (self.0)()
    }
}

impl Default for DataFactory {
    fn default() -> Self {
        Self::new(Data::new)
    }
}

impl fmt::Debug for DataFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataFactory")
    }
}

/// An async key → `(state, data)` store.
///
/// Contract:
///
/// - `get_state`/`get_data` on an unseen key behave as if the key exists
///   with `state = None` and `data = factory()`.
/// - `set_state(key, None)` clears the state to `None`.
/// - `set_data(key, None)` resets the data to a fresh `factory()` value.
/// - `init` is called once before first use, `close` once at shutdown.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Prepares the backend (load from disk, connect, ...).
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Persists and releases everything the backend holds.
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Returns the current state name of `key`.
    async fn get_state(&self, key: &str) -> StorageResult<Option<String>>;

    /// Sets (or with `None`, clears) the state of `key`.
    async fn set_state(&self, key: &str, state: Option<&str>) -> StorageResult<()>;

    /// Returns an independent copy of the data of `key`.
    async fn get_data(&self, key: &str) -> StorageResult<Data>;

    /// Replaces the data of `key`; `None` resets it to the factory default.
    async fn set_data(&self, key: &str, data: Option<Data>) -> StorageResult<()>;

    /// Shallow-merges `partial` into the data of `key`.
    async fn update_data(&self, key: &str, partial: Data) -> StorageResult<()>;

    /// Clears the state of `key`.
    async fn reset_state(&self, key: &str) -> StorageResult<()> {
        self.set_state(key, None).await
    }

    /// Resets the data of `key` to the factory default.
    async fn reset_data(&self, key: &str) -> StorageResult<()> {
        self.set_data(key, None).await
    }

    /// Clears both state and data of `key`.
    async fn reset(&self, key: &str) -> StorageResult<()> {
        self.reset_state(key).await?;
        self.reset_data(key).await
    }
}

/// A shareable storage backend.
pub type BoxedStorage = Arc<dyn Storage>;

