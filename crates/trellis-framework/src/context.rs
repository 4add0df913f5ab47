//! Ambient, task-local dispatch context.
//!
//! Every handler attempt runs inside a [`scope`] that binds one
//! [`HandlerContext`]: the current event, the chat/user pair derived from
//! it, the [`UserCage`] for that pair, the client and the handler name.
//! Filters and handler bodies read it through the free functions in this
//! module instead of threading parameters around:
//!
//! ```rust,ignore
//! async fn remember_name(event: BoxedEvent) -> Result<(), HandlerError> {
//!     let cage = context::cage().ok_or_else(|| HandlerError::msg("no subject"))?;
//!     cage.update_fields([("name", event.text().unwrap_or_default())]).await?;
//!     Ok(())
//! }
//! ```
//!
//! The binding is a `tokio::task_local!`, so two updates dispatched
//! concurrently never observe each other's values, and the previous binding
//! is restored when the scoped future completes, panics or is dropped.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::{BoxedClient, BoxedEvent, EventKind};

use crate::cage::UserCage;
use crate::error::HandlerError;
use crate::filters::query::Query;
use crate::handler::Flow;
use crate::state::Member;

tokio::task_local! {
    static CURRENT: Arc<HandlerContext>;
}

/// Everything bound for the duration of one handler attempt.
///
/// The event, identities, cage and client are fixed at creation. The
/// current member and current query are published by filters while the
/// attempt runs, so later filters and the handler body can read them.
/// A filter that cannot decide because a backend failed records the failure
/// here; the attempt then ends as a handler failure instead of a mismatch.
pub struct HandlerContext {
    event: BoxedEvent,
    chat_id: Option<i64>,
    user_id: Option<i64>,
    cage: Option<UserCage>,
    client: BoxedClient,
    handler: Arc<str>,
    member: Mutex<Option<Member>>,
    query: Mutex<Option<Query>>,
    outcome: Mutex<Option<Result<Flow, HandlerError>>>,
    failure: Mutex<Option<HandlerError>>,
}

impl HandlerContext {
    /// Creates a context for one handler attempt.
    pub fn new(
        event: BoxedEvent,
        cage: Option<UserCage>,
        client: BoxedClient,
        handler: Arc<str>,
    ) -> Self {
        Self {
            chat_id: event.chat_id(),
            user_id: event.sender_id(),
            event,
            cage,
            client,
            handler,
            member: Mutex::new(None),
            query: Mutex::new(None),
            outcome: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }

    /// Returns the event being handled.
    pub fn event(&self) -> &BoxedEvent {
        &self.event
    }

    /// Returns the kind of the event being handled.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Returns the chat the event happened in.
    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    /// Returns the user that caused the event.
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// Returns the FSM context of the subject, if one could be keyed.
    pub fn cage(&self) -> Option<&UserCage> {
        self.cage.as_ref()
    }

    /// Returns the client the event came from.
    pub fn client(&self) -> &BoxedClient {
        &self.client
    }

    /// Returns the name of the handler being attempted.
    pub fn handler_name(&self) -> &str {
        &self.handler
    }

    /// Returns the member published by the last matching state filter.
    pub fn member(&self) -> Option<Member> {
        self.member.lock().clone()
    }

    /// Returns the query published by the last matching callback filter.
    pub fn query(&self) -> Option<Query> {
        self.query.lock().clone()
    }

    pub(crate) fn publish_member(&self, member: Member) {
        *self.member.lock() = Some(member);
    }

    pub(crate) fn publish_query(&self, query: Query) {
        *self.query.lock() = Some(query);
    }

    pub(crate) fn record_outcome(&self, outcome: Result<Flow, HandlerError>) {
        *self.outcome.lock() = Some(outcome);
    }

    pub(crate) fn take_outcome(&self) -> Option<Result<Flow, HandlerError>> {
        self.outcome.lock().take()
    }

    /// Keeps the first failure.
    pub(crate) fn record_failure(&self, err: HandlerError) {
        self.failure.lock().get_or_insert(err);
    }

    pub(crate) fn take_failure(&self) -> Option<HandlerError> {
        self.failure.lock().take()
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("event", &self.event)
            .field("chat_id", &self.chat_id)
            .field("user_id", &self.user_id)
            .field("handler", &self.handler)
            .field("member", &self.member())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Scoping
// =============================================================================

/// Runs `fut` with `ctx` bound as the ambient context.
pub async fn scope<F: Future>(ctx: Arc<HandlerContext>, fut: F) -> F::Output {
    CURRENT.scope(ctx, fut).await
}

/// Runs `f` with `ctx` bound as the ambient context.
///
/// Used to carry the binding onto blocking threads.
pub fn sync_scope<R>(ctx: Arc<HandlerContext>, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(ctx, f)
}

/// Returns the ambient context, if called inside a handler attempt.
pub fn current() -> Option<Arc<HandlerContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

// =============================================================================
// Accessors
// =============================================================================

/// Returns the current event.
pub fn event() -> Option<BoxedEvent> {
    CURRENT.try_with(|ctx| ctx.event.clone()).ok()
}

/// Returns the current chat id.
pub fn chat_id() -> Option<i64> {
    CURRENT.try_with(|ctx| ctx.chat_id).ok().flatten()
}

/// Returns the current user id.
pub fn user_id() -> Option<i64> {
    CURRENT.try_with(|ctx| ctx.user_id).ok().flatten()
}

/// Returns the current FSM context.
pub fn cage() -> Option<UserCage> {
    CURRENT.try_with(|ctx| ctx.cage.clone()).ok().flatten()
}

/// Returns the current client.
pub fn client() -> Option<BoxedClient> {
    CURRENT.try_with(|ctx| ctx.client.clone()).ok()
}

/// Returns the name of the current handler.
pub fn handler_name() -> Option<String> {
    CURRENT.try_with(|ctx| ctx.handler.to_string()).ok()
}

/// Returns the current state member.
pub fn member() -> Option<Member> {
    CURRENT.try_with(|ctx| ctx.member()).ok().flatten()
}

/// Returns the current parsed callback query.
pub fn query() -> Option<Query> {
    CURRENT.try_with(|ctx| ctx.query()).ok().flatten()
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use async_trait::async_trait;
    use trellis_core::{BoxedUpdate, Client, Event, TransportResult};
    use trellis_storage::MemoryStorage;

    use super::*;

    #[derive(Debug)]
    struct Ping;

    impl Event for Ping {
        fn kind(&self) -> EventKind {
            EventKind::NewMessage
        }

        fn sender_id(&self) -> Option<i64> {
            Some(5)
        }

        fn chat_id(&self) -> Option<i64> {
            Some(4)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Idle;

    #[async_trait]
    impl Client for Idle {
        async fn next_update(&self) -> Option<BoxedUpdate> {
            None
        }

        async fn self_id(&self) -> TransportResult<i64> {
            Ok(1)
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn ctx() -> Arc<HandlerContext> {
        let storage = Arc::new(MemoryStorage::new());
        let cage = UserCage::new(storage, Some(4), Some(5)).unwrap();
        Arc::new(HandlerContext::new(
            BoxedEvent::new(Ping),
            Some(cage),
            Arc::new(Idle),
            Arc::from("ping"),
        ))
    }

    #[test]
    fn test_accessors_outside_scope() {
        assert!(current().is_none());
        assert!(event().is_none());
        assert_eq!(chat_id(), None);
        assert!(cage().is_none());
        assert!(member().is_none());
    }

    #[test]
    fn test_scope_binds_and_restores() {
        tokio_test::block_on(async {
            let seen = scope(ctx(), async {
                (chat_id(), user_id(), handler_name(), cage().map(|c| c.key().to_owned()))
            })
            .await;

            assert_eq!(
                seen,
                (Some(4), Some(5), Some("ping".to_owned()), Some("4:5".to_owned()))
            );
            assert!(current().is_none());
        });
    }

    #[test]
    fn test_sync_scope_sees_published_member() {
        let group = crate::StateGroup::from_states("Form", ["name"]).unwrap();
        let name = group.member("name").unwrap();
        let ctx = ctx();
        ctx.publish_member(name.clone());

        assert_eq!(sync_scope(ctx, member), Some(name));
    }
}
