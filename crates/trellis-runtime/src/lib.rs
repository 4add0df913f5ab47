//! # Trellis Runtime
//!
//! Everything needed to run a router tree against a live client:
//!
//! - **Configuration** ([`config`]): layered figment loading of
//!   [`TrellisConfig`] and the storage backend factory
//! - **Logging** ([`logging`]): `tracing-subscriber` setup from configuration
//! - **Dispatch** ([`Dispatcher`]): one update, one walk of the router tree
//! - **Run loop** ([`Runner`]): storage lifecycle, a task per update,
//!   graceful shutdown
//! - **In-memory transport** ([`ChannelClient`]) for tests and demos
//!
//! ```rust,ignore
//! use trellis_runtime::{ConfigLoader, Runner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load()?;
//!     Runner::from_config(client, router, &config)?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod runner;

pub use channel::{ChannelClient, UpdateSender};
pub use config::{
    ConfigLoadError, ConfigLoader, ConfigResult, DispatchMode, LoggingConfig, Profile,
    StorageBackend, StorageConfig, TrellisConfig, build_storage,
};
pub use dispatcher::Dispatcher;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runner::Runner;

// Re-export tracing for use by applications
pub use tracing;
pub use tracing_subscriber;

/// Logging macros, for `use trellis_runtime::prelude::*`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
