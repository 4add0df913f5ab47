//! The transport collaborator.
//!
//! Trellis never manages the protocol connection itself. It only needs to
//! pull the next raw update and to know who it is running as; everything
//! else (authentication, reconnects, entity caches) stays in the client.
//!
//! ```rust,ignore
//! struct MyClient { /* ... */ }
//!
//! #[async_trait]
//! impl Client for MyClient {
//!     async fn next_update(&self) -> Option<BoxedUpdate> { /* ... */ }
//!     async fn self_id(&self) -> TransportResult<i64> { Ok(42) }
//!     fn is_connected(&self) -> bool { true }
//! }
//! ```

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::event::BoxedUpdate;

/// A source of raw updates.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Waits for the next raw update.
    ///
    /// Returns `None` once the transport is disconnected.
    async fn next_update(&self) -> Option<BoxedUpdate>;

    /// Resolves the identity of the running account.
    async fn self_id(&self) -> TransportResult<i64>;

    /// Returns `true` while the transport is connected.
    fn is_connected(&self) -> bool;

    /// Returns a reference to self as `Any`, so handlers can reach the
    /// concrete client type.
    fn as_any(&self) -> &dyn Any;
}

/// A shareable client.
pub type BoxedClient = Arc<dyn Client>;
