//! Redis-backed storage.
//!
//! Each subject occupies two keys, `{prefix}:{key}:state` and
//! `{prefix}:{key}:data`, each with its own optional expiry. Operations are
//! independent commands; concurrent writers to the same key resolve as
//! last-write-wins.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::base::{Data, DataFactory, Storage};
use crate::error::{StorageError, StorageResult};

/// Which half of a record a Redis key holds.
#[derive(Debug, Clone, Copy)]
enum Field {
    State,
    Data,
}

impl Field {
    fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Data => "data",
        }
    }
}

/// A storage backend talking to a Redis server.
///
/// The connection is opened lazily on first use. Only that first connect is
/// serialised; afterwards every operation clones the multiplexed connection
/// and runs without a shared lock.
pub struct RedisStorage {
    client: redis::Client,
    prefix: String,
    state_ttl: Option<Duration>,
    data_ttl: Option<Duration>,
    factory: DataFactory,
    connection: RwLock<Option<MultiplexedConnection>>,
    connect_lock: Mutex<()>,
}

impl RedisStorage {
    /// Creates a backend for the server at `url` (e.g. `redis://127.0.0.1/0`).
    pub fn new(url: &str) -> StorageResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            prefix: "fsm".to_owned(),
            state_ttl: None,
            data_ttl: None,
            factory: DataFactory::default(),
            connection: RwLock::new(None),
            connect_lock: Mutex::new(()),
        })
    }

    /// Sets the key prefix (default `"fsm"`).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Expires state keys after `ttl`.
    pub fn state_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Expires data keys after `ttl`.
    pub fn data_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.data_ttl = ttl;
        self
    }

    /// Sets the default data factory.
    pub fn factory(mut self, factory: DataFactory) -> Self {
        self.factory = factory;
        self
    }

    fn key(&self, key: &str, field: Field) -> String {
        format!("{}:{}:{}", self.prefix, key, field.as_str())
    }

    /// Expiry in milliseconds, rounded up so a short TTL never becomes 0.
    fn ttl(&self, field: Field) -> Option<u64> {
        match field {
            Field::State => self.state_ttl,
            Field::Data => self.data_ttl,
        }
        .map(|ttl| u64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX))
        .filter(|millis| *millis > 0)
    }

    async fn connection(&self) -> StorageResult<MultiplexedConnection> {
        if let Some(conn) = self.connection.read().as_ref() {
            return Ok(conn.clone());
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(conn) = self.connection.read().as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        info!(prefix = %self.prefix, "Connected to redis");
        *self.connection.write() = Some(conn.clone());
        Ok(conn)
    }

    async fn write(&self, key: &str, field: Field, value: String) -> StorageResult<()> {
        let mut conn = self.connection().await?;
        let redis_key = self.key(key, field);
        match self.ttl(field) {
            Some(millis) => conn.pset_ex::<_, _, ()>(redis_key, value, millis).await?,
            None => conn.set::<_, _, ()>(redis_key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str, field: Field) -> StorageResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.key(key, field)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("prefix", &self.prefix)
            .field("state_ttl", &self.state_ttl)
            .field("data_ttl", &self.data_ttl)
            .field("connected", &self.connection.read().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn init(&self) -> StorageResult<()> {
        self.connection().await.map(|_| ())
    }

    async fn close(&self) -> StorageResult<()> {
        if self.connection.write().take().is_some() {
            debug!(prefix = %self.prefix, "Released redis connection");
        }
        Ok(())
    }

    async fn get_state(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(self.key(key, Field::State)).await?)
    }

    async fn set_state(&self, key: &str, state: Option<&str>) -> StorageResult<()> {
        match state {
            Some(state) => self.write(key, Field::State, state.to_owned()).await,
            None => self.delete(key, Field::State).await,
        }
    }

    async fn get_data(&self, key: &str) -> StorageResult<Data> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(key, Field::Data)).await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(self.factory.make()),
        }
    }

    async fn set_data(&self, key: &str, data: Option<Data>) -> StorageResult<()> {
        let data = data.unwrap_or_else(|| self.factory.make());
        let encoded = serde_json::to_string(&data).map_err(StorageError::from)?;
        self.write(key, Field::Data, encoded).await
    }

    async fn update_data(&self, key: &str, partial: Data) -> StorageResult<()> {
        let mut data = self.get_data(key).await?;
        data.extend(partial);
        self.set_data(key, Some(data)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let storage = RedisStorage::new("redis://127.0.0.1/0")
            .unwrap()
            .prefix("bot");

        assert_eq!(storage.key("100:7", Field::State), "bot:100:7:state");
        assert_eq!(storage.key("100:7", Field::Data), "bot:100:7:data");
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let storage = RedisStorage::new("redis://127.0.0.1/0")
            .unwrap()
            .state_ttl(Some(Duration::ZERO))
            .data_ttl(Some(Duration::from_secs(60)));

        assert_eq!(storage.ttl(Field::State), None);
        assert_eq!(storage.ttl(Field::Data), Some(60_000));
    }

    #[test]
    fn test_sub_second_ttl_still_expires() {
        let storage = RedisStorage::new("redis://127.0.0.1/0")
            .unwrap()
            .state_ttl(Some(Duration::from_millis(500)))
            .data_ttl(Some(Duration::from_micros(1)));

        assert_eq!(storage.ttl(Field::State), Some(500));
        assert_eq!(storage.ttl(Field::Data), Some(1));
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let storage = RedisStorage::new("redis://127.0.0.1/0").unwrap();
        storage.close().await.unwrap();
    }
}
