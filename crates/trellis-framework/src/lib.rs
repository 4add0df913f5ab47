//! # Trellis Framework
//!
//! Event routing and conversational state on top of [`trellis_core`] events
//! and [`trellis_storage`] backends.
//!
//! - **Filters** ([`filter`], [`filters`], [`state`]): a composable boolean
//!   algebra over events and FSM state
//! - **FSM** ([`state`], [`cage`]): declared state groups and the
//!   per-subject [`UserCage`]
//! - **Handlers** ([`handler`], [`extractor`]): async functions with
//!   injected arguments, returning a [`Flow`]
//! - **Routing** ([`router`], [`middleware`]): a tree of routers tried
//!   depth-first, first match wins
//! - **Ambient context** ([`context`]): task-local access to the current
//!   event, subject and member from anywhere inside a handler attempt

pub mod cage;
pub mod context;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod filters;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod state;

pub use cage::{IntoStateName, KeyMaker, UserCage, default_key, default_key_maker};
pub use context::HandlerContext;
pub use error::{
    CageError, ConfigError, ExtractError, ExtractResult, HandlerError, QueryError, StateError,
};
pub use extractor::{ChatId, CurrentMember, CurrentQuery, Event, FromContext, UserId};
pub use filter::Filter;
pub use filters::{ArgType, Query, QueryBuilder};
pub use handler::{Flow, Handler, HandlerFn, HandlerResponse, HandlerService};
pub use middleware::{Middleware, Next};
pub use router::{DispatchEnv, DispatchOutcome, Router};
pub use state::{Member, StateGroup, StateGroupBuilder, StateTarget};
