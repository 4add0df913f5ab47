//! Handlers and their bodies.
//!
//! - **Bodies** ([`traits`]): [`HandlerFn`] adapts async functions with
//!   extractor arguments, [`HandlerResponse`] turns their return values
//!   into a [`Flow`]
//! - **Handlers** ([`service`]): [`Handler`] binds a body to an event kind
//!   and a filter chain; the body runs as a tower [`HandlerService`]
//!
//! ```text
//! Router ─▶ Handler { kind, filters } ─▶ middleware… ─▶ HandlerService ─▶ fn(extractors…)
//! ```

pub mod service;
pub mod traits;

pub use service::{Handler, HandlerService, into_service};
pub use traits::{Flow, HandlerFn, HandlerResponse};
