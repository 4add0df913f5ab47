//! # Trellis Storage
//!
//! Pluggable backends for conversational (FSM) state.
//!
//! Every backend implements the [`Storage`] contract: an async map from an
//! opaque composite key to a `(state, data)` pair, with `init`/`close`
//! lifecycle hooks. Router and cage code only ever sees `Arc<dyn Storage>`,
//! so backends can be swapped without touching application code.
//!
//! | Backend | Persistence | Feature |
//! |---------|-------------|---------|
//! | [`MemoryStorage`] | none | - |
//! | [`JsonStorage`] | single JSON document | - |
//! | `RedisStorage` | remote key-value store | `redis` |

pub mod base;
pub mod error;
pub mod json;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_storage;

pub use base::{BoxedStorage, Data, DataFactory, Storage};
pub use error::{StorageError, StorageResult};
pub use json::JsonStorage;
pub use memory::{MemoryStorage, Record};
#[cfg(feature = "redis")]
pub use redis_storage::RedisStorage;
