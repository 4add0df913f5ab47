//! # Trellis
//!
//! Event routing and finite-state conversations on top of a Telegram client.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐  update  ┌────────┐  EventCache  ┌──────────────┐
//! │ Client │─────────▶│ Runner │─────────────▶│ Router tree  │──▶ handler
//! └────────┘          └────────┘  (own task)  │ filters, FSM │
//!                         │                   └──────────────┘
//!                         └── Storage: init once, close once
//! ```
//!
//! - **Routers** are tried depth-first; the first handler whose filters all
//!   pass handles the update, unless it skips
//! - **Filters** compose with `and`, `or`, `xor` and `!`, and may read the FSM state
//! - **Cages** give each chat/user pair its own state and data
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! let form = StateGroup::from_states("Form", ["name", "age"])?;
//! let router = Router::new();
//! router.on_new_message([text::commands(["start"]), state::entry()], {
//!     let name = form.member("name");
//!     move |cage: UserCage| {
//!         let name = name.clone();
//!         async move { cage.set_state(name).await }
//!     }
//! })?;
//!
//! let config = ConfigLoader::new().load()?;
//! Runner::from_config(client, router, &config)?.run().await?;
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `trellis.toml` configuration files
//! - `yaml-config`: `trellis.yaml` configuration files
//! - `json-log`: JSON log output
//! - `redis`: the Redis storage backend

pub use trellis_core as core;
pub use trellis_framework as framework;
pub use trellis_runtime as runtime;
pub use trellis_storage as storage;

/// Commonly used types for building bots:
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use trellis_runtime::{ChannelClient, ConfigLoader, DispatchMode, Dispatcher, Runner};

    // Routing
    pub use trellis_framework::middleware::{self, Next};
    pub use trellis_framework::{DispatchOutcome, Filter, Flow, Handler, Router};

    // Filters
    pub use trellis_framework::filters::{QueryBuilder, file, text};
    pub use trellis_framework::state;

    // FSM
    pub use trellis_framework::{Member, StateGroup, UserCage};

    // Extractors
    pub use trellis_framework::{
        ChatId, CurrentMember, CurrentQuery, Event, FromContext, HandlerContext, UserId,
    };
    pub use trellis_framework::{HandlerError, context};

    // Core types for custom clients and events
    pub use trellis_core::{
        BoxedClient, BoxedEvent, BoxedUpdate, Client, Event as EventTrait, EventKind, RawUpdate,
    };

    // Storage
    pub use trellis_storage::{BoxedStorage, JsonStorage, MemoryStorage, Storage};
}
