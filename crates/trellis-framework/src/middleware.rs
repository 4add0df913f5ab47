//! Router middleware.
//!
//! Middleware wraps the invocation of a handler body. It only runs once the
//! handler's filters have all passed, and sees the same ambient context as
//! the body. Any tower [`Layer`] over [`HandlerService`] can be registered;
//! [`from_fn`] covers the common case of a plain async function:
//!
//! ```rust,ignore
//! router.use_middleware(middleware::from_fn(|ctx, next: Next| async move {
//!     let started = Instant::now();
//!     let flow = next.run(ctx).await;
//!     debug!(elapsed = ?started.elapsed(), "Handler finished");
//!     flow
//! }));
//! ```
//!
//! Middleware is transparent to the body's control flow: whatever it returns,
//! the router acts on the `Skip`/`Stop`/failure the body itself produced.
//! Middleware that returns without calling `next` decides the outcome itself.

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

use crate::context::HandlerContext;
use crate::error::HandlerError;
use crate::handler::{Flow, HandlerService};

/// A type-erased middleware: wraps one handler service in another.
pub type Middleware = Arc<dyn Fn(HandlerService) -> HandlerService + Send + Sync>;

/// Erases a tower layer into a [`Middleware`].
pub fn from_layer<L>(layer: L) -> Middleware
where
    L: Layer<HandlerService> + Send + Sync + 'static,
    L::Service: Service<Arc<HandlerContext>, Response = Flow, Error = HandlerError>
        + Clone
        + Send
        + Sync
        + 'static,
    <L::Service as Service<Arc<HandlerContext>>>::Future: Send + 'static,
{
    Arc::new(move |inner| BoxCloneSyncService::new(layer.layer(inner)))
}

/// The rest of the chain, handed to [`from_fn`] middleware.
#[derive(Clone)]
pub struct Next {
    inner: HandlerService,
}

impl Next {
    /// Runs the remaining middleware and the handler body.
    pub async fn run(self, ctx: Arc<HandlerContext>) -> Result<Flow, HandlerError> {
        self.inner.oneshot(ctx).await
    }
}

/// Creates a middleware layer from an async function.
pub fn from_fn<F, Fut>(f: F) -> FnLayer<F>
where
    F: Fn(Arc<HandlerContext>, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow, HandlerError>> + Send + 'static,
{
    FnLayer { f }
}

/// A [`Layer`] built by [`from_fn`].
#[derive(Clone)]
pub struct FnLayer<F> {
    f: F,
}

impl<F: Clone> Layer<HandlerService> for FnLayer<F> {
    type Service = FnService<F>;

    fn layer(&self, inner: HandlerService) -> Self::Service {
        FnService {
            f: self.f.clone(),
            inner,
        }
    }
}

/// The service produced by [`FnLayer`].
#[derive(Clone)]
pub struct FnService<F> {
    f: F,
    inner: HandlerService,
}

impl<F, Fut> Service<Arc<HandlerContext>> for FnService<F>
where
    F: Fn(Arc<HandlerContext>, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow, HandlerError>> + Send + 'static,
{
    type Response = Flow;
    type Error = HandlerError;
    type Future = BoxFuture<'static, Result<Flow, HandlerError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<HandlerContext>) -> Self::Future {
        let next = Next {
            inner: self.inner.clone(),
        };
        (self.f)(ctx, next).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use trellis_core::{
        BoxedClient, BoxedEvent, BoxedUpdate, Client, Event, EventKind, TransportResult,
    };

    use crate::handler::into_service;

    #[derive(Debug)]
    struct Ping;

    impl Event for Ping {
        fn kind(&self) -> EventKind {
            EventKind::NewMessage
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Offline;

    #[async_trait]
    impl Client for Offline {
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
        let client: BoxedClient = Arc::new(Offline);
        Arc::new(HandlerContext::new(
            BoxedEvent::new(Ping),
            None,
            client,
            Arc::from("test"),
        ))
    }

    #[tokio::test]
    async fn test_fn_middleware_wraps_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let layer = from_fn(move |ctx, next: Next| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(ctx).await
            }
        });

        let body = into_service(|| async { Flow::Skip });
        let wrapped = from_layer(layer)(body);
        let ctx = ctx();

        assert_eq!(wrapped.oneshot(ctx.clone()).await.unwrap(), Flow::Skip);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.take_outcome().unwrap().unwrap(), Flow::Skip);
    }

    #[tokio::test]
    async fn test_short_circuit_leaves_no_outcome() {
        let ran = Arc::new(AtomicUsize::new(0));
        let body_ran = ran.clone();
        let layer = from_fn(|_ctx, _next: Next| async { Ok(Flow::Stop) });
        let body = into_service(move || {
            let body_ran = body_ran.clone();
            async move {
                body_ran.fetch_add(1, Ordering::SeqCst);
            }
        });
        let ctx = ctx();

        let flow = from_layer(layer)(body).oneshot(ctx.clone()).await.unwrap();
        assert_eq!(flow, Flow::Stop);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(ctx.take_outcome().is_none());
    }
}
