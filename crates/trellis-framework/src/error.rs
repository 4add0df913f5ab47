//! Error types for the Trellis framework.

use std::sync::Arc;

use thiserror::Error;
use tower::BoxError;
use trellis_core::EventKind;
use trellis_storage::StorageError;

// =============================================================================
// Configuration errors
// =============================================================================

/// Wiring mistakes, reported as soon as the offending call is made.
///
/// Everything in here is fatal to startup: composing incompatible filters,
/// building a router tree with cycles or duplicates, or declaring states
/// that cannot be named unambiguously.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Two kind-aware filters targeting different kinds were composed.
    #[error("cannot compose filters for '{left}' and '{right}' events")]
    IncompatibleKinds {
        /// Kind of the left operand.
        left: EventKind,
        /// Kind of the right operand.
        right: EventKind,
    },

    /// A handler was registered with a filter expecting another kind.
    #[error("filter '{filter}' expects '{filter_kind}' events but handler '{handler}' handles '{handler_kind}'")]
    IncompatibleFilter {
        /// Name of the filter.
        filter: String,
        /// Kind the filter expects.
        filter_kind: EventKind,
        /// Name of the handler.
        handler: String,
        /// Kind the handler handles.
        handler_kind: EventKind,
    },

    /// A router was included into itself.
    #[error("router '{0}' cannot include itself")]
    SelfInclusion(String),

    /// A router was included twice into the same tree.
    #[error("router '{0}' is already included")]
    DuplicateInclusion(String),

    /// Including a router would close a cycle.
    #[error("including router '{0}' would create a cycle")]
    CyclicInclusion(String),

    /// A handler was registered without a kind on a router with no default kind.
    #[error("router '{0}' has no default event kind")]
    NoDefaultKind(String),

    /// Neither chat id nor user id is available to build a storage key.
    #[error("cannot build a storage key without chat id or user id")]
    MissingKey,

    /// A state group or member name is not usable.
    #[error("invalid state declaration: {0}")]
    InvalidState(String),

    /// A text pattern failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// A required callback query argument was not given a value.
    #[error("query argument '{0}' is required but has no expected value")]
    MissingQueryArg(String),
}

impl ConfigError {
    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

// =============================================================================
// State navigation
// =============================================================================

/// Ordinal navigation past the ends of a state group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The member is the last of its group.
    #[error("state '{0}' has no next state")]
    NoNext(String),

    /// The member is the first of its group.
    #[error("state '{0}' has no previous state")]
    NoPrev(String),

    /// The group has no members at all.
    #[error("state group '{0}' has no states")]
    NoTop(String),
}

// =============================================================================
// Cage errors
// =============================================================================

/// Errors raised by [`UserCage`](crate::cage::UserCage) operations.
#[derive(Debug, Error)]
pub enum CageError {
    /// `update_data` was given something that is not a mapping.
    #[error("update_data expects a mapping, got {0}")]
    NotAMapping(&'static str),

    /// The partial update could not be serialized.
    #[error("failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// =============================================================================
// Callback queries
// =============================================================================

/// Errors raised while building or parsing callback query payloads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// The built payload exceeds the configured limit.
    #[error("query payload is {len} bytes, limit is {max}")]
    TooLong {
        /// Actual length in bytes.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// No value was given for a declared argument.
    #[error("missing value for query argument '{0}'")]
    MissingValue(String),

    /// The payload has the wrong number of parts.
    #[error("expected {expected} query parts, got {got}")]
    WrongArity {
        /// Declared argument count.
        expected: usize,
        /// Parts found in the payload.
        got: usize,
    },

    /// A part could not be converted to its declared type.
    #[error("invalid value '{value}' for query argument '{arg}'")]
    InvalidValue {
        /// Argument name.
        arg: String,
        /// Offending raw value.
        value: String,
    },

    /// The payload is not valid UTF-8.
    #[error("query payload is not valid UTF-8")]
    NotUtf8,
}

// =============================================================================
// Extraction
// =============================================================================

/// Errors that can occur during context extraction.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The event type does not match the expected type.
    #[error("event type mismatch: expected '{expected}'")]
    EventTypeMismatch {
        /// Expected type name.
        expected: &'static str,
    },

    /// The requested value is not present in this dispatch.
    #[error("'{0}' is not available in this context")]
    Missing(&'static str),

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

// =============================================================================
// Handler failures
// =============================================================================

/// An unexpected failure inside a handler body or middleware.
///
/// Cheap to clone, so the outcome of a handler can be recorded and still be
/// returned through the middleware chain.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(Arc<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    /// Wraps any error.
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(Arc::from(err.into()))
    }

    /// Creates an error from a message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::new(msg.into())
    }

    /// Returns the wrapped error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl From<CageError> for HandlerError {
    fn from(err: CageError) -> Self {
        Self::new(err)
    }
}

impl From<StorageError> for HandlerError {
    fn from(err: StorageError) -> Self {
        Self::new(err)
    }
}

impl From<StateError> for HandlerError {
    fn from(err: StateError) -> Self {
        Self::new(err)
    }
}
