//! Configuration validation.

use super::error::{ConfigLoadError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, StorageBackend, StorageConfig, TrellisConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TrellisConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_storage(&config.storage)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigLoadError::validation(
            "logging.output = \"file\" requires logging.file_path",
        ));
    }
    if logging.max_files == 0 {
        return Err(ConfigLoadError::validation(
            "logging.max_files must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> ConfigResult<()> {
    match storage.backend {
        StorageBackend::Memory => {}
        StorageBackend::Json => {
            if storage.path.as_os_str().is_empty() {
                return Err(ConfigLoadError::validation(
                    "storage.path is required for the json backend",
                ));
            }
        }
        StorageBackend::Redis => {
            let url = &storage.redis.url;
            if !["redis://", "rediss://", "unix://", "redis+unix://"]
                .iter()
                .any(|scheme| url.starts_with(scheme))
            {
                return Err(ConfigLoadError::validation(format!(
                    "storage.redis.url must be a redis URL, got '{url}'"
                )));
            }
            if storage.redis.prefix.is_empty() {
                return Err(ConfigLoadError::validation(
                    "storage.redis.prefix cannot be empty",
                ));
            }
            for (field, ttl) in [
                ("state_ttl_secs", storage.redis.state_ttl_secs),
                ("data_ttl_secs", storage.redis.data_ttl_secs),
            ] {
                if ttl == Some(0) {
                    return Err(ConfigLoadError::validation(format!(
                        "storage.redis.{field} must be greater than 0 when set"
                    )));
                }
            }
        }
    }
    Ok(())
}
