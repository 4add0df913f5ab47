//! # Trellis Core
//!
//! The event model shared by every Trellis crate.
//!
//! - **Events**: kind-tagged, type-erased views of incoming updates
//!   ([`Event`], [`EventKind`], [`BoxedEvent`])
//! - **Raw updates**: what the transport delivers ([`RawUpdate`]), read
//!   lazily through an [`EventCache`] scoped to one dispatch cycle
//! - **Client**: the narrow transport interface ([`Client`]) that yields
//!   updates and resolves the running account's identity
//!
//! ```text
//! ┌────────────┐  RawUpdate  ┌────────────┐  BoxedEvent  ┌─────────┐
//! │   Client   │────────────▶│ EventCache │─────────────▶│ Router  │
//! └────────────┘             └────────────┘   (lazy)     └─────────┘
//! ```

pub mod client;
pub mod error;
pub mod event;

pub use client::{BoxedClient, Client};
pub use error::{TransportError, TransportResult};
pub use event::{BoxedEvent, BoxedUpdate, Event, EventCache, EventKind, RawUpdate};
