//! Ready-made filters.
//!
//! - [`text`]: message text checks (commands, patterns, numbers, length)
//! - [`query`]: typed callback query payloads
//! - [`file`]: attached document extensions
//!
//! State filters live in [`crate::state`].

pub mod file;
pub mod query;
pub mod text;

pub use query::{ArgType, Query, QueryArg, QueryBuilder};
