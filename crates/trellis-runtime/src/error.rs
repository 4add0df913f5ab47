//! Runtime error types.

use thiserror::Error;
use trellis_core::TransportError;
use trellis_storage::StorageError;

use crate::config::ConfigLoadError;

/// Errors that end a run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Opening or closing the storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The client could not resolve its identity.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded or applied.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    /// The update loop panicked. Storage was closed before this was returned.
    #[error("update loop panicked: {0}")]
    Panicked(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
