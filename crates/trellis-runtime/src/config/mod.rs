//! Configuration for the Trellis runtime.
//!
//! Layered loading with figment, the configuration schema, validation, and
//! the factory that turns a [`StorageConfig`] into a storage backend.

pub mod error;
pub mod loader;
pub mod schema;
pub mod storage;
pub mod validation;

pub use error::{ConfigLoadError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    DispatchConfig, DispatchMode, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    RedisConfig, SpanEventConfig, StorageBackend, StorageConfig, TrellisConfig,
};
pub use storage::build_storage;
pub use validation::validate_config;
