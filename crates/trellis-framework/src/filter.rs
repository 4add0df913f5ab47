//! The filter algebra.
//!
//! A [`Filter`] is a boolean predicate over the current event, optionally
//! tagged with the [`EventKind`] it expects. Filters without a kind are
//! *event-naive*: they are always called with `None` and are meant for
//! checks that only look at ambient state (FSM state, rate limits, ...).
//!
//! # Evaluation
//!
//! Asynchronous predicates are awaited in place. Synchronous predicates are
//! moved to the blocking pool with the ambient context re-entered there, so
//! a slow predicate never stalls other dispatch tasks.
//!
//! # Composition
//!
//! ```rust,ignore
//! let age_step = state::exact(&form_age);          // naive
//! let digits = text::is_digit();                    // NewMessage
//!
//! let accept = age_step.clone().and(digits.clone())?;   // NewMessage
//! let reject = age_step.and(!digits)?;                  // NewMessage
//! ```
//!
//! Binary operators always evaluate both operands, and fail at composition
//! time if both sides expect different kinds.

use std::fmt;
use std::future::Future;
use std::ops::Not;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{trace, warn};

use trellis_core::{BoxedEvent, Event, EventKind};

use crate::context;
use crate::error::ConfigError;

/// A synchronous predicate.
pub type SyncPredicateFn = Arc<dyn Fn(Option<&BoxedEvent>) -> bool + Send + Sync>;

/// An asynchronous predicate.
pub type AsyncPredicateFn =
    Arc<dyn Fn(Option<BoxedEvent>) -> BoxFuture<'static, bool> + Send + Sync>;

#[derive(Clone)]
enum Predicate {
    Sync(SyncPredicateFn),
    Async(AsyncPredicateFn),
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    And,
    Or,
    Xor,
}

impl BinaryOp {
    fn apply(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left & right,
            Self::Or => left | right,
            Self::Xor => left ^ right,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
        }
    }
}

/// A composable predicate over incoming events.
///
/// Cloning is cheap; clones share the predicate.
#[derive(Clone)]
pub struct Filter {
    predicate: Predicate,
    kind: Option<EventKind>,
    name: Arc<str>,
}

impl Filter {
    // ─── Constructors ────────────────────────────────────────────────────────

    /// Creates an event-naive filter from a synchronous predicate.
    ///
    /// The predicate always receives `None`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&BoxedEvent>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Predicate::Sync(Arc::new(f)),
            kind: None,
            name: Arc::from(std::any::type_name::<F>()),
        }
    }

    /// Creates an event-naive filter from an asynchronous predicate.
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Option<BoxedEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            predicate: Predicate::Async(Arc::new(move |event| f(event).boxed())),
            kind: None,
            name: Arc::from(std::any::type_name::<F>()),
        }
    }

    /// Creates a filter over events of `kind` from a synchronous predicate.
    ///
    /// If the update cannot be read as `kind` the filter fails.
    pub fn on<F>(kind: EventKind, f: F) -> Self
    where
        F: Fn(&BoxedEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Predicate::Sync(Arc::new(move |event: Option<&BoxedEvent>| {
                event.is_some_and(&f)
            })),
            kind: Some(kind),
            name: Arc::from(std::any::type_name::<F>()),
        }
    }

    /// Creates a filter over events of `kind` from an asynchronous predicate.
    pub fn on_async<F, Fut>(kind: EventKind, f: F) -> Self
    where
        F: Fn(BoxedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let f = Arc::new(f);
        Self {
            predicate: Predicate::Async(Arc::new(move |event| match event {
                Some(event) => f(event).boxed(),
                None => futures::future::ready(false).boxed(),
            })),
            kind: Some(kind),
            name: Arc::from(std::any::type_name::<F>()),
        }
    }

    /// Creates a filter that passes when `extract` yields `expected`.
    pub fn eq<T, F>(kind: EventKind, extract: F, expected: T) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
        F: Fn(&dyn Event) -> Option<T> + Send + Sync + 'static,
    {
        Self::on(kind, move |event| {
            extract(&**event).is_some_and(|value| value == expected)
        })
    }

    /// Creates a filter that passes when `extract` yields one of `values`.
    pub fn one_of<T, F, I>(kind: EventKind, extract: F, values: I) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
        F: Fn(&dyn Event) -> Option<T> + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        Self::on(kind, move |event| {
            extract(&**event).is_some_and(|value| values.contains(&value))
        })
    }

    /// Sets the name shown in logs and configuration errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    /// Returns the name of this filter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind this filter expects, or `None` if it is event-naive.
    pub fn event_kind(&self) -> Option<EventKind> {
        self.kind
    }

    /// Returns `true` if this filter does not look at the event.
    pub fn is_event_naive(&self) -> bool {
        self.kind.is_none()
    }

    /// Returns `true` if the predicate was declared asynchronous.
    pub fn is_awaitable(&self) -> bool {
        matches!(self.predicate, Predicate::Async(_))
    }

    // ─── Evaluation ──────────────────────────────────────────────────────────

    /// Evaluates the filter.
    ///
    /// Event-naive filters receive `None` regardless of `event`. A
    /// synchronous predicate that panics counts as a failed check.
    pub async fn call(&self, event: Option<BoxedEvent>) -> bool {
        let event = self.kind.and(event);
        let passed = match &self.predicate {
            Predicate::Async(f) => f(event).await,
            Predicate::Sync(f) => {
                let f = Arc::clone(f);
                let ambient = context::current();
                let job = move || match ambient {
                    Some(ctx) => context::sync_scope(ctx, || f(event.as_ref())),
                    None => f(event.as_ref()),
                };
                match tokio::task::spawn_blocking(job).await {
                    Ok(passed) => passed,
                    Err(e) => {
                        warn!(filter = %self.name, error = %e, "Filter predicate panicked");
                        false
                    }
                }
            }
        };
        trace!(filter = %self.name, passed, "Filter evaluated");
        passed
    }

    // ─── Composition ─────────────────────────────────────────────────────────

    /// Combines two filters with logical AND.
    pub fn and(self, other: Filter) -> Result<Filter, ConfigError> {
        self.combine(other, BinaryOp::And)
    }

    /// Combines two filters with logical OR.
    pub fn or(self, other: Filter) -> Result<Filter, ConfigError> {
        self.combine(other, BinaryOp::Or)
    }

    /// Combines two filters with logical XOR.
    pub fn xor(self, other: Filter) -> Result<Filter, ConfigError> {
        self.combine(other, BinaryOp::Xor)
    }

    fn combine(self, other: Filter, op: BinaryOp) -> Result<Filter, ConfigError> {
        let kind = match (self.kind, other.kind) {
            (Some(left), Some(right)) if left != right => {
                return Err(ConfigError::IncompatibleKinds { left, right });
            }
            (left, right) => left.or(right),
        };
        let name: Arc<str> = Arc::from(format!("({} {} {})", self.name, op.symbol(), other.name));

        let predicate = match (self.predicate.clone(), other.predicate.clone()) {
            (Predicate::Sync(left), Predicate::Sync(right)) => {
                let (left_kind, right_kind) = (self.kind, other.kind);
                Predicate::Sync(Arc::new(move |event: Option<&BoxedEvent>| {
                    let l = left(left_kind.and(event));
                    let r = right(right_kind.and(event));
                    op.apply(l, r)
                }))
            }
            _ => {
                let (left, right) = (self, other);
                Predicate::Async(Arc::new(move |event: Option<BoxedEvent>| {
                    let (left, right) = (left.clone(), right.clone());
                    async move {
                        let l = left.call(event.clone()).await;
                        let r = right.call(event).await;
                        op.apply(l, r)
                    }
                    .boxed()
                }))
            }
        };

        Ok(Filter {
            predicate,
            kind,
            name,
        })
    }

    fn negate(self) -> Filter {
        let name: Arc<str> = Arc::from(format!("!{}", self.name));
        let kind = self.kind;
        let predicate = match self.predicate {
            Predicate::Sync(f) => {
                Predicate::Sync(Arc::new(move |event: Option<&BoxedEvent>| !f(event)))
            }
            Predicate::Async(f) => {
                Predicate::Async(Arc::new(move |event| f(event).map(|passed| !passed).boxed()))
            }
        };
        Filter {
            predicate,
            kind,
            name,
        }
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.negate()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("awaitable", &self.is_awaitable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Text(&'static str);

    impl Event for Text {
        fn kind(&self) -> EventKind {
            EventKind::NewMessage
        }

        fn text(&self) -> Option<&str> {
            Some(self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn message(text: &'static str) -> Option<BoxedEvent> {
        Some(BoxedEvent::new(Text(text)))
    }

    fn yes() -> Filter {
        Filter::new(|_| true)
    }

    fn no() -> Filter {
        Filter::new(|_| false)
    }

    #[test]
    fn test_kind_inference() {
        let a = Filter::on(EventKind::NewMessage, |_| true);
        let b = Filter::on(EventKind::NewMessage, |_| true);
        let c = yes();

        assert_eq!(a.clone().and(c.clone()).unwrap().event_kind(), Some(EventKind::NewMessage));
        assert_eq!(c.clone().and(a.clone()).unwrap().event_kind(), Some(EventKind::NewMessage));
        assert_eq!(a.clone().and(b).unwrap().event_kind(), Some(EventKind::NewMessage));
        assert_eq!(c.clone().or(yes()).unwrap().event_kind(), None);
        assert_eq!((!a).event_kind(), Some(EventKind::NewMessage));
    }

    #[test]
    fn test_mismatched_kinds_are_rejected() {
        let a = Filter::on(EventKind::NewMessage, |_| true);
        let d = Filter::on(EventKind::CallbackQuery, |_| true);

        let err = a.xor(d).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IncompatibleKinds {
                left: EventKind::NewMessage,
                right: EventKind::CallbackQuery
            }
        ));
    }

    #[tokio::test]
    async fn test_boolean_operators() {
        assert!(yes().and(yes()).unwrap().call(None).await);
        assert!(!yes().and(no()).unwrap().call(None).await);
        assert!(yes().or(no()).unwrap().call(None).await);
        assert!(!no().or(no()).unwrap().call(None).await);
        assert!(yes().xor(no()).unwrap().call(None).await);
        assert!(!yes().xor(yes()).unwrap().call(None).await);
        assert!((!no()).call(None).await);
    }

    #[tokio::test]
    async fn test_both_operands_always_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |result: bool| {
            let calls = calls.clone();
            Filter::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                result
            })
        };

        assert!(!counted(false).and(counted(true)).unwrap().call(None).await);
        assert!(counted(true).or(counted(false)).unwrap().call(None).await);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_naive_filter_receives_no_event() {
        let saw_event = Filter::new(|event| event.is_some());
        assert!(!saw_event.call(message("hi")).await);

        let aware = Filter::on(EventKind::NewMessage, |event| event.text() == Some("hi"));
        assert!(aware.call(message("hi")).await);
        assert!(!aware.call(None).await);
    }

    #[tokio::test]
    async fn test_mixed_composition_routes_event() {
        let naive = Filter::new_async(|event| async move { event.is_none() });
        let aware = Filter::on(EventKind::NewMessage, |event| event.text() == Some("ok"));

        let both = naive.and(aware).unwrap();
        assert!(both.is_awaitable());
        assert!(both.call(message("ok")).await);
        assert!(!both.call(message("nope")).await);
    }

    #[tokio::test]
    async fn test_panicking_predicate_fails() {
        let broken = Filter::new(|_| panic!("boom"));
        assert!(!broken.call(None).await);
    }

    #[tokio::test]
    async fn test_equality_helpers() {
        let text = |event: &dyn Event| event.text().map(str::to_owned);

        let hello = Filter::eq(EventKind::NewMessage, text, "hello".to_owned());
        assert!(hello.call(message("hello")).await);
        assert!(!hello.call(message("bye")).await);

        let pets = Filter::one_of(
            EventKind::NewMessage,
            text,
            ["Cat".to_owned(), "Dog".to_owned()],
        );
        assert!(pets.call(message("Dog")).await);
        assert!(!pets.call(message("Goose")).await);
    }
}
