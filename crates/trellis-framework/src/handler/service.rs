//! Registered handlers.
//!
//! A [`Handler`] binds one event kind, an ordered filter chain and a body.
//! The body is stored as a type-erased tower service, [`HandlerService`],
//! so router middleware can be stacked on it as ordinary tower layers.

use std::fmt;
use std::sync::Arc;

use tower::service_fn;
use tower::util::BoxCloneSyncService;

use trellis_core::EventKind;

use super::traits::{Flow, HandlerFn};
use crate::context::HandlerContext;
use crate::error::{ConfigError, HandlerError};
use crate::filter::Filter;

/// The type-erased service behind every handler.
pub type HandlerService = BoxCloneSyncService<Arc<HandlerContext>, Flow, HandlerError>;

/// Wraps a handler function into a [`HandlerService`].
///
/// The service records its own outcome in the context before returning it,
/// so the router still sees the body's `Skip`/`Stop`/failure when a
/// middleware rewrites the response.
pub fn into_service<F, T>(f: F) -> HandlerService
where
    F: HandlerFn<T>,
    T: 'static,
{
    BoxCloneSyncService::new(service_fn(move |ctx: Arc<HandlerContext>| {
        let f = f.clone();
        async move {
            let outcome = f.call(Arc::clone(&ctx)).await;
            ctx.record_outcome(outcome.clone());
            outcome
        }
    }))
}

/// A unit of work bound to one event kind.
///
/// ```rust,ignore
/// let handler = Handler::new(EventKind::NewMessage, greet)
///     .filter(text::commands(["start"]))
///     .filter(state::entry())
///     .named("greet");
/// router.register(handler)?;
/// ```
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    kind: EventKind,
    filters: Vec<Filter>,
    service: HandlerService,
}

impl Handler {
    /// Creates a handler for events of `kind`, named after the function type.
    pub fn new<F, T>(kind: EventKind, f: F) -> Self
    where
        F: HandlerFn<T>,
        T: 'static,
    {
        Self {
            name: Arc::from(std::any::type_name::<F>()),
            kind,
            filters: Vec::new(),
            service: into_service(f),
        }
    }

    /// Appends a filter to the chain.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Appends several filters to the chain, in order.
    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Sets the name shown in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the filter chain, in evaluation order.
    pub fn filter_chain(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns a fresh handle to the body service.
    pub fn service(&self) -> HandlerService {
        self.service.clone()
    }

    /// Checks that every kind-aware filter expects this handler's kind.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for filter in &self.filters {
            if let Some(filter_kind) = filter.event_kind()
                && filter_kind != self.kind
            {
                return Err(ConfigError::IncompatibleFilter {
                    filter: filter.name().to_owned(),
                    filter_kind,
                    handler: self.name.to_string(),
                    handler_kind: self.kind,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}
