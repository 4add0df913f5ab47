//! Builds the configured storage backend.

use std::sync::Arc;

use tracing::info;
use trellis_storage::{BoxedStorage, JsonStorage, MemoryStorage};

use super::error::{ConfigLoadError, ConfigResult};
use super::schema::{StorageBackend, StorageConfig};

/// Creates the backend selected by `config`.
///
/// Nothing is opened here; the runner calls `init` before the first update.
pub fn build_storage(config: &StorageConfig) -> ConfigResult<BoxedStorage> {
    let storage: BoxedStorage = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::Json => Arc::new(JsonStorage::new(config.path.clone())),
        StorageBackend::Redis => build_redis(config)?,
    };
    info!(backend = ?config.backend, "Storage backend selected");
    Ok(storage)
}

#[cfg(feature = "redis")]
fn build_redis(config: &StorageConfig) -> ConfigResult<BoxedStorage> {
    let redis = &config.redis;
    let storage = trellis_storage::RedisStorage::new(&redis.url)
        .map_err(|e| ConfigLoadError::validation(format!("storage.redis.url: {e}")))?
        .prefix(redis.prefix.clone())
        .state_ttl(redis.state_ttl())
        .data_ttl(redis.data_ttl());
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "redis"))]
fn build_redis(_config: &StorageConfig) -> ConfigResult<BoxedStorage> {
    Err(ConfigLoadError::BackendDisabled("redis"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_backend_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Json,
            path: dir.path().join("state").join("fsm.json"),
            ..Default::default()
        };

        let storage = build_storage(&config).unwrap();
        storage.init().await.unwrap();
        storage.set_state("1:2", Some("Form.name")).await.unwrap();
        storage.close().await.unwrap();

        assert!(config.path.exists());
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_redis_backend_requires_feature() {
        let config = StorageConfig {
            backend: StorageBackend::Redis,
            ..Default::default()
        };
        assert!(matches!(
            build_storage(&config),
            Err(ConfigLoadError::BackendDisabled("redis"))
        ));
    }
}
