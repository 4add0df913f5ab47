//! The router tree and the matching algorithm.
//!
//! A [`Router`] owns upper filters, handlers, middleware and child routers.
//! [`Router::notify`] walks the tree depth-first for one update:
//!
//! ```text
//! notify(router)
//!   ├─ upper filters ── any fails ──▶ Unmatched (children skipped too)
//!   ├─ own handlers, in registration order
//!   │    ├─ update has no event of handler.kind ─▶ next handler
//!   │    └─ scope(ctx) { filters… ─▶ middleware… ─▶ body }
//!   │         Continue ─▶ Matched   Skip ─▶ next handler
//!   │         Stop ─────▶ Stopped   failure ─▶ logged, Stopped
//!   └─ children, in inclusion order; first non-Unmatched result wins
//! ```
//!
//! Routers are shared handles: cloning one yields the same node, and
//! handlers registered after an `include` are still seen by the parent.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, error, trace};

use trellis_core::{BoxedClient, BoxedEvent, EventCache, EventKind};
use trellis_storage::BoxedStorage;

use crate::cage::{KeyMaker, UserCage, default_key_maker};
use crate::context::{self, HandlerContext};
use crate::error::{ConfigError, HandlerError};
use crate::filter::Filter;
use crate::handler::{Flow, Handler, HandlerFn, HandlerService};
use crate::middleware::{self, Middleware};

static NEXT_ROUTER_ID: AtomicU64 = AtomicU64::new(1);

/// How far one update got through a router tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// A handler handled the update.
    Matched,
    /// No handler accepted the update.
    Unmatched,
    /// A handler stopped propagation or failed.
    Stopped,
}

/// What a dispatch needs besides the update itself.
#[derive(Clone)]
pub struct DispatchEnv {
    pub storage: BoxedStorage,
    pub client: BoxedClient,
    pub key_maker: KeyMaker,
}

impl DispatchEnv {
    /// Creates an environment using the default key layout.
    pub fn new(storage: BoxedStorage, client: BoxedClient) -> Self {
        Self {
            storage,
            client,
            key_maker: default_key_maker(),
        }
    }

    /// Replaces the key maker.
    pub fn with_key_maker(mut self, key_maker: KeyMaker) -> Self {
        self.key_maker = key_maker;
        self
    }

    fn cage_for(&self, event: &BoxedEvent) -> Option<UserCage> {
        match (self.key_maker)(event.chat_id(), event.sender_id()) {
            Ok(key) => Some(UserCage::from_key(Arc::clone(&self.storage), key)),
            Err(e) => {
                debug!(kind = %event.kind(), error = %e, "No subject for event");
                None
            }
        }
    }
}

impl fmt::Debug for DispatchEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEnv").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RouterState {
    upper_filters: Vec<Filter>,
    handlers: Vec<Arc<Handler>>,
    children: Vec<Router>,
    middleware: Vec<Middleware>,
}

struct RouterInner {
    id: u64,
    name: RwLock<Arc<str>>,
    default_kind: Option<EventKind>,
    state: RwLock<RouterState>,
}

/// A node of the routing tree.
///
/// ```rust,ignore
/// let form = Router::new().named("form");
/// form.on_new_message([text::commands(["start"]), state::entry()], start)?
///     .on_new_message([state::exact(&name)], ask_age)?;
///
/// let root = Router::new().upper_filter(private_chats_only());
/// root.include(&form)?;
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router without a default event kind.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an empty router whose [`on_default`](Self::on_default) registers `kind`.
    pub fn with_kind(kind: EventKind) -> Self {
        Self::build(Some(kind))
    }

    fn build(default_kind: Option<EventKind>) -> Self {
        let id = NEXT_ROUTER_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::new(RouterInner {
                id,
                name: RwLock::new(Arc::from(format!("router#{id}"))),
                default_kind,
                state: RwLock::new(RouterState::default()),
            }),
        }
    }

    /// Sets the name shown in logs and errors.
    pub fn named(self, name: impl Into<String>) -> Self {
        *self.inner.name.write() = Arc::from(name.into());
        self
    }

    /// Adds a filter gating the whole subtree.
    pub fn upper_filter(self, filter: Filter) -> Self {
        self.inner.state.write().upper_filters.push(filter);
        self
    }

    pub fn name(&self) -> Arc<str> {
        self.inner.name.read().clone()
    }

    pub fn default_kind(&self) -> Option<EventKind> {
        self.inner.default_kind
    }

    pub fn handler_count(&self) -> usize {
        self.inner.state.read().handlers.len()
    }

    pub fn child_count(&self) -> usize {
        self.inner.state.read().children.len()
    }

    /// Returns `true` if both handles refer to the same node.
    pub fn same_as(&self, other: &Router) -> bool {
        self.inner.id == other.inner.id
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a handler at the end of this router's handler list.
    pub fn register(&self, handler: Handler) -> Result<&Self, ConfigError> {
        handler.validate()?;
        debug!(
            router = %self.name(),
            handler = handler.name(),
            kind = %handler.kind(),
            filters = handler.filter_chain().len(),
            "Registered handler"
        );
        self.inner.state.write().handlers.push(Arc::new(handler));
        Ok(self)
    }

    /// Registers `f` for events of `kind` behind `filters`.
    pub fn on<F, T>(
        &self,
        kind: EventKind,
        filters: impl IntoIterator<Item = Filter>,
        f: F,
    ) -> Result<&Self, ConfigError>
    where
        F: HandlerFn<T>,
        T: 'static,
    {
        self.register(Handler::new(kind, f).filters(filters))
    }

    /// Registers `f` for this router's default kind.
    pub fn on_default<F, T>(
        &self,
        filters: impl IntoIterator<Item = Filter>,
        f: F,
    ) -> Result<&Self, ConfigError>
    where
        F: HandlerFn<T>,
        T: 'static,
    {
        let kind = self
            .inner
            .default_kind
            .ok_or_else(|| ConfigError::NoDefaultKind(self.name().to_string()))?;
        self.on(kind, filters, f)
    }

    pub fn on_new_message<F, T>(
        &self,
        filters: impl IntoIterator<Item = Filter>,
        f: F,
    ) -> Result<&Self, ConfigError>
    where
        F: HandlerFn<T>,
        T: 'static,
    {
        self.on(EventKind::NewMessage, filters, f)
    }

    pub fn on_message_edited<F, T>(
        &self,
        filters: impl IntoIterator<Item = Filter>,
        f: F,
    ) -> Result<&Self, ConfigError>
    where
        F: HandlerFn<T>,
        T: 'static,
    {
        self.on(EventKind::MessageEdited, filters, f)
    }

    pub fn on_callback_query<F, T>(
        &self,
        filters: impl IntoIterator<Item = Filter>,
        f: F,
    ) -> Result<&Self, ConfigError>
    where
        F: HandlerFn<T>,
        T: 'static,
    {
        self.on(EventKind::CallbackQuery, filters, f)
    }

    pub fn on_chat_action<F, T>(
        &self,
        filters: impl IntoIterator<Item = Filter>,
        f: F,
    ) -> Result<&Self, ConfigError>
    where
        F: HandlerFn<T>,
        T: 'static,
    {
        self.on(EventKind::ChatAction, filters, f)
    }

    /// Wraps every handler of this subtree in `layer`.
    ///
    /// The first registered middleware is the outermost; a parent's
    /// middleware wraps its children's.
    pub fn use_middleware<L>(&self, layer: L) -> &Self
    where
        L: Layer<HandlerService> + Send + Sync + 'static,
        L::Service: Service<Arc<HandlerContext>, Response = Flow, Error = HandlerError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Arc<HandlerContext>>>::Future: Send + 'static,
    {
        self.inner
            .state
            .write()
            .middleware
            .push(middleware::from_layer(layer));
        self
    }

    /// Appends `child` to this router's children.
    ///
    /// Rejects including a router into itself, including it twice into the
    /// same tree, and inclusions that would close a cycle.
    pub fn include(&self, child: &Router) -> Result<&Self, ConfigError> {
        if self.same_as(child) {
            return Err(ConfigError::SelfInclusion(self.name().to_string()));
        }
        if self.contains(child.inner.id) {
            return Err(ConfigError::DuplicateInclusion(child.name().to_string()));
        }
        if child.contains(self.inner.id) {
            return Err(ConfigError::CyclicInclusion(child.name().to_string()));
        }
        debug!(router = %self.name(), child = %child.name(), "Included router");
        self.inner.state.write().children.push(child.clone());
        Ok(self)
    }

    fn contains(&self, id: u64) -> bool {
        let children = self.inner.state.read().children.clone();
        children
            .iter()
            .any(|child| child.inner.id == id || child.contains(id))
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    /// Dispatches one update through this subtree.
    pub async fn notify(&self, events: &EventCache, env: &DispatchEnv) -> DispatchOutcome {
        self.notify_with(events, env, &[]).await
    }

    fn notify_with<'a>(
        &'a self,
        events: &'a EventCache,
        env: &'a DispatchEnv,
        inherited: &'a [Middleware],
    ) -> BoxFuture<'a, DispatchOutcome> {
        async move {
            let (upper_filters, handlers, children, own_middleware) = {
                let state = self.inner.state.read();
                (
                    state.upper_filters.clone(),
                    state.handlers.clone(),
                    state.children.clone(),
                    state.middleware.clone(),
                )
            };

            for filter in &upper_filters {
                if !check_upper(filter, events).await {
                    trace!(router = %self.name(), filter = filter.name(), "Upper filter rejected update");
                    return DispatchOutcome::Unmatched;
                }
            }

            let chain: Vec<Middleware> = inherited.iter().chain(&own_middleware).cloned().collect();

            for handler in &handlers {
                let Some(event) = events.get(handler.kind()) else {
                    continue;
                };
                match attempt(handler, event, env, &chain).await {
                    None => continue,
                    Some(Ok(Flow::Continue)) => {
                        debug!(router = %self.name(), handler = handler.name(), "Handler matched");
                        return DispatchOutcome::Matched;
                    }
                    Some(Ok(Flow::Skip)) => {
                        debug!(handler = handler.name(), "Handler skipped");
                        continue;
                    }
                    Some(Ok(Flow::Stop)) => {
                        debug!(handler = handler.name(), "Propagation stopped");
                        return DispatchOutcome::Stopped;
                    }
                    Some(Err(e)) => {
                        error!(
                            handler = handler.name(),
                            kind = %handler.kind(),
                            error = %e,
                            "Handler failed"
                        );
                        return DispatchOutcome::Stopped;
                    }
                }
            }

            for child in &children {
                match child.notify_with(events, env, &chain).await {
                    DispatchOutcome::Unmatched => continue,
                    outcome => return outcome,
                }
            }

            DispatchOutcome::Unmatched
        }
        .boxed()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Router")
            .field("name", &self.name())
            .field("default_kind", &self.inner.default_kind)
            .field("upper_filters", &state.upper_filters)
            .field("handlers", &state.handlers)
            .field("children", &state.children)
            .field("middleware", &state.middleware.len())
            .finish()
    }
}

async fn check_upper(filter: &Filter, events: &EventCache) -> bool {
    match filter.event_kind() {
        None => filter.call(None).await,
        Some(kind) => match events.get(kind) {
            Some(event) => filter.call(Some(event)).await,
            None => false,
        },
    }
}

/// Runs one handler attempt inside its own ambient scope.
///
/// Returns `None` when a filter rejected the event.
async fn attempt(
    handler: &Handler,
    event: BoxedEvent,
    env: &DispatchEnv,
    chain: &[Middleware],
) -> Option<Result<Flow, HandlerError>> {
    let ctx = Arc::new(HandlerContext::new(
        event.clone(),
        env.cage_for(&event),
        Arc::clone(&env.client),
        handler.name_arc(),
    ));

    let scoped = Arc::clone(&ctx);
    context::scope(ctx, async move {
        for filter in handler.filter_chain() {
            let passed = filter.call(Some(event.clone())).await;
            // A combinator may have inverted or masked the failing filter.
            if let Some(e) = scoped.take_failure() {
                return Some(Err(e));
            }
            if !passed {
                trace!(handler = handler.name(), filter = filter.name(), "Filter rejected event");
                return None;
            }
        }

        let service = chain
            .iter()
            .rev()
            .fold(handler.service(), |inner, mw| mw(inner));
        let returned = service.oneshot(Arc::clone(&scoped)).await;

        Some(match (returned, scoped.take_outcome()) {
            (Err(e), _) => Err(e),
            (Ok(_), Some(recorded)) => recorded,
            (Ok(flow), None) => Ok(flow),
        })
    })
    .await
}
