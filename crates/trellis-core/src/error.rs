//! Error types for the transport collaborator.

use thiserror::Error;

/// Errors surfaced by a [`Client`](crate::Client) implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection is gone and no further updates will arrive.
    #[error("transport disconnected")]
    Disconnected,

    /// The client could not resolve its own identity.
    #[error("failed to resolve self identity: {0}")]
    Identity(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Creates an identity resolution error.
    pub fn identity(reason: impl Into<String>) -> Self {
        Self::Identity(reason.into())
    }

    /// Creates a generic transport error.
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other(reason.into())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
