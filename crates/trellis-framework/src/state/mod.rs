//! Conversational states.
//!
//! - [`StateGroup`] / [`Member`]: declared states with ordinal navigation
//! - [`any`], [`entry`], [`equals`], [`exact`]: filters over the current state

pub mod filter;
pub mod group;

pub use filter::{StateTarget, any, entry, equals, exact};
pub use group::{Member, StateGroup, StateGroupBuilder};
