//! Extractor system.
//!
//! Handler functions declare what they need as arguments; each argument
//! type implements [`FromContext`] and is pulled from the
//! [`HandlerContext`] of the current attempt.
//!
//! If an extractor fails the handler is skipped. Wrap an argument in
//! [`Option<T>`] to make it optional.
//!
//! ```rust,ignore
//! async fn on_pet(
//!     event: Event<TextMessage>,
//!     cage: UserCage,
//!     CurrentMember(step): CurrentMember,
//! ) -> Result<(), HandlerError> {
//!     cage.update_fields([("pet", event.text.clone())]).await?;
//!     cage.set_state(step.next().ok()).await?;
//!     Ok(())
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;

use trellis_core::{BoxedClient, BoxedEvent, Event as EventTrait};

use crate::cage::UserCage;
use crate::context::HandlerContext;
use crate::error::{ExtractError, ExtractResult};
use crate::filters::query::Query;
use crate::state::Member;

/// A type that can be extracted from the [`HandlerContext`] of an attempt.
pub trait FromContext: Sized {
    /// Attempts the extraction; `Err` skips the handler.
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self>;
}

impl FromContext for BoxedEvent {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(ctx.event().clone())
    }
}

impl FromContext for Arc<HandlerContext> {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx))
    }
}

impl FromContext for BoxedClient {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(ctx.client().clone())
    }
}

/// Fails when the event could not be keyed to a subject.
impl FromContext for UserCage {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.cage().cloned().ok_or(ExtractError::Missing("user cage"))
    }
}

impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

/// The concrete event type, cloned out of the current event.
///
/// Fails with [`ExtractError::EventTypeMismatch`] when the event is of
/// another type.
#[derive(Debug, Clone)]
pub struct Event<T>(pub T);

impl<T> Deref for Event<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: EventTrait + Clone> FromContext for Event<T> {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.event()
            .downcast_ref::<T>()
            .cloned()
            .map(Event)
            .ok_or(ExtractError::EventTypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }
}

/// The member published by the state filter that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentMember(pub Member);

impl FromContext for CurrentMember {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.member()
            .map(CurrentMember)
            .ok_or(ExtractError::Missing("current member"))
    }
}

/// The callback payload parsed by the query filter that matched.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentQuery(pub Query);

impl FromContext for CurrentQuery {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.query()
            .map(CurrentQuery)
            .ok_or(ExtractError::Missing("current query"))
    }
}

/// The chat the event happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl FromContext for ChatId {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.chat_id().map(ChatId).ok_or(ExtractError::Missing("chat id"))
    }
}

/// The user that caused the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

impl FromContext for UserId {
    fn from_context(ctx: &Arc<HandlerContext>) -> ExtractResult<Self> {
        ctx.user_id().map(UserId).ok_or(ExtractError::Missing("user id"))
    }
}
