//! One update in, one router walk out.

use std::fmt;

use tracing::{Instrument, debug, debug_span};
use trellis_core::{BoxedClient, BoxedUpdate, EventCache};
use trellis_framework::{DispatchEnv, DispatchOutcome, KeyMaker, Router};
use trellis_storage::BoxedStorage;

/// Feeds updates to a router tree.
///
/// Cloning is cheap; the runner hands a clone to every dispatch task.
#[derive(Clone)]
pub struct Dispatcher {
    router: Router,
    storage: BoxedStorage,
    key_maker: Option<KeyMaker>,
}

impl Dispatcher {
    pub fn new(router: Router, storage: BoxedStorage) -> Self {
        Self {
            router,
            storage,
            key_maker: None,
        }
    }

    /// Replaces the default `"{chat}:{user}"` storage key layout.
    pub fn key_maker(mut self, key_maker: KeyMaker) -> Self {
        self.key_maker = Some(key_maker);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn storage(&self) -> &BoxedStorage {
        &self.storage
    }

    /// Dispatches one update.
    ///
    /// The update's typed views are built lazily and shared by every filter
    /// and handler that looks at them during this call.
    pub async fn dispatch(
        &self,
        update: BoxedUpdate,
        client: BoxedClient,
        self_id: i64,
    ) -> DispatchOutcome {
        let mut env = DispatchEnv::new(self.storage.clone(), client);
        if let Some(key_maker) = &self.key_maker {
            env = env.with_key_maker(key_maker.clone());
        }
        let events = EventCache::new(update, self_id);

        let span = debug_span!("dispatch", router = %self.router.name());
        async {
            let outcome = self.router.notify(&events, &env).await;
            debug!(?outcome, built = ?events.built_kinds(), "Update dispatched");
            outcome
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router.name())
            .field("custom_key", &self.key_maker.is_some())
            .finish_non_exhaustive()
    }
}
