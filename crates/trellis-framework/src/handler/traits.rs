//! Handler functions.
//!
//! [`HandlerFn`] is implemented for async functions taking up to twelve
//! [`FromContext`] arguments and returning a [`HandlerResponse`]. Extractors
//! run first; if any of them fails the handler is skipped, as if one of its
//! filters had rejected the event.
//!
//! ```rust,ignore
//! async fn ask_age(cage: UserCage, event: BoxedEvent) -> Result<(), HandlerError> {
//!     cage.update_fields([("name", event.text().unwrap_or_default())]).await?;
//!     cage.set_state(&form_age).await?;
//!     Ok(())
//! }
//!
//! async fn only_admins(UserId(id): UserId) -> Flow {
//!     if ADMINS.contains(&id) { Flow::Continue } else { Flow::Skip }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;
use tracing::debug;

use crate::context::HandlerContext;
use crate::error::HandlerError;
use crate::extractor::FromContext;

// =============================================================================
// Flow
// =============================================================================

/// What the router does after a handler body returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flow {
    /// The event is handled; no other handler runs.
    #[default]
    Continue,
    /// Abandon this handler and keep looking, as if its filters had failed.
    Skip,
    /// Abandon the whole dispatch of this update.
    Stop,
}

// =============================================================================
// HandlerResponse
// =============================================================================

/// Values a handler body may return.
pub trait HandlerResponse: Send + 'static {
    /// Converts the value into a control-flow decision.
    fn into_flow(self) -> Result<Flow, HandlerError>;
}

impl HandlerResponse for () {
    fn into_flow(self) -> Result<Flow, HandlerError> {
        Ok(Flow::Continue)
    }
}

impl HandlerResponse for Flow {
    fn into_flow(self) -> Result<Flow, HandlerError> {
        Ok(self)
    }
}

/// `None` counts as handled.
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    fn into_flow(self) -> Result<Flow, HandlerError> {
        self.map_or(Ok(Flow::Continue), HandlerResponse::into_flow)
    }
}

/// `Err` is a handler failure.
impl<T, E> HandlerResponse for Result<T, E>
where
    T: HandlerResponse,
    E: Into<BoxError> + Send + 'static,
{
    fn into_flow(self) -> Result<Flow, HandlerError> {
        match self {
            Ok(value) => value.into_flow(),
            Err(e) => Err(HandlerError::new(e)),
        }
    }
}

// =============================================================================
// HandlerFn
// =============================================================================

/// An async function usable as a handler body.
///
/// `T` is the tuple of extractor types and only serves to keep the blanket
/// implementations apart.
#[async_trait]
pub trait HandlerFn<T>: Clone + Send + Sync + 'static {
    /// Extracts the arguments and runs the body.
    async fn call(self, ctx: Arc<HandlerContext>) -> Result<Flow, HandlerError>;
}

macro_rules! impl_handler_fn {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_variables)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> HandlerFn<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: HandlerResponse,
            $( $ty: FromContext + Send + 'static, )*
        {
            async fn call(self, ctx: Arc<HandlerContext>) -> Result<Flow, HandlerError> {
                $(
                    let $ty = match $ty::from_context(&ctx) {
                        Ok(value) => value,
                        Err(e) => {
                            debug!(
                                handler = ctx.handler_name(),
                                error = %e,
                                "Extraction failed, skipping handler"
                            );
                            return Ok(Flow::Skip);
                        }
                    };
                )*

                (self)($($ty,)*).await.into_flow()
            }
        }
    };
}

impl_handler_fn!();
impl_handler_fn!(T1);
impl_handler_fn!(T1, T2);
impl_handler_fn!(T1, T2, T3);
impl_handler_fn!(T1, T2, T3, T4);
impl_handler_fn!(T1, T2, T3, T4, T5);
impl_handler_fn!(T1, T2, T3, T4, T5, T6);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
