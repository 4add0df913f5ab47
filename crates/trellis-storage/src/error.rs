//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by storage backends.
///
/// These always reach the caller of the cage operation that triggered them;
/// losing conversational state silently is never an option.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted document does not have the expected layout.
    #[error("corrupt storage file {path}: {reason}")]
    Corrupt {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The remote key-value store reported an error.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
