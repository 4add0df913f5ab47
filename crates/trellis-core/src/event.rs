//! Event system for the Trellis framework.
//!
//! This module provides the core event infrastructure:
//!
//! - [`EventKind`] - The tag identifying which shape of update an event has
//! - [`Event`] - Base trait for all typed event views
//! - [`BoxedEvent`] - Type-erased, cheaply clonable event handle
//! - [`RawUpdate`] - An incoming update that can be read as one or more kinds
//! - [`EventCache`] - Lazily materialised typed views of a single update
//!
//! # Lazy Materialisation
//!
//! A raw update is wrapped once per dispatch cycle. Typed views are only
//! built when some handler or filter asks for that kind, and the result
//! (including "this update is not of that kind") is cached until the cycle
//! ends:
//!
//! ```rust,ignore
//! let cache = EventCache::new(update, self_id);
//!
//! // Built on first access...
//! let msg = cache.get(EventKind::NewMessage);
//! // ...and served from the cache afterwards.
//! let again = cache.get(EventKind::NewMessage);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

// ============================================================================
// Event Kind
// ============================================================================

/// Classification of incoming updates.
///
/// Handlers and kind-aware filters declare the kind they expect; the router
/// uses it as a cheap pre-check before evaluating any filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new message was posted.
    NewMessage,
    /// An existing message was edited.
    MessageEdited,
    /// One or more messages were deleted.
    MessageDeleted,
    /// Messages were marked as read.
    MessageRead,
    /// An inline keyboard button was pressed.
    CallbackQuery,
    /// A user typed an inline query.
    InlineQuery,
    /// Something happened in a chat (joins, leaves, title changes, ...).
    ChatAction,
    /// A user's status changed (online, typing, ...).
    UserUpdate,
    /// A grouped media message.
    Album,
    /// The raw, unclassified update.
    Raw,
    /// A protocol-specific kind not covered above.
    Custom(&'static str),
}

impl EventKind {
    /// Returns the snake_case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::MessageEdited => "message_edited",
            Self::MessageDeleted => "message_deleted",
            Self::MessageRead => "message_read",
            Self::CallbackQuery => "callback_query",
            Self::InlineQuery => "inline_query",
            Self::ChatAction => "chat_action",
            Self::UserUpdate => "user_update",
            Self::Album => "album",
            Self::Raw => "raw",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for typed event views.
///
/// Events are type-erased using `dyn Event` and can be downcast to concrete
/// types through [`BoxedEvent::downcast_ref`]. The optional accessors are
/// what the framework needs to derive the conversational subject and to run
/// the built-in text and callback filters; protocol adapters override the
/// ones their event shape supports.
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// Returns the kind of this event.
    fn kind(&self) -> EventKind;

    /// Returns the id of the user that caused this event, if any.
    fn sender_id(&self) -> Option<i64> {
        None
    }

    /// Returns the id of the chat this event happened in, if any.
    fn chat_id(&self) -> Option<i64> {
        None
    }

    /// Returns the raw message text, if this event carries one.
    fn text(&self) -> Option<&str> {
        None
    }

    /// Returns the callback payload of a button press.
    fn query_data(&self) -> Option<&[u8]> {
        None
    }

    /// Returns the file name of an attached document.
    fn file_name(&self) -> Option<&str> {
        None
    }

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Boxed Event
// ============================================================================

/// A type-erased container for events that supports runtime downcasting.
///
/// `BoxedEvent` implements `Deref<Target = dyn Event>`, so trait methods can
/// be called directly:
///
/// ```rust,ignore
/// let event: BoxedEvent = /* ... */;
/// if let Some(text) = event.text() {
///     println!("{} said {text}", event.sender_id().unwrap_or_default());
/// }
/// ```
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
}

impl BoxedEvent {
    /// Creates a new `BoxedEvent` from any type implementing `Event`.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    /// Returns the inner `Arc<dyn Event>`.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Attempts to downcast to a concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref()
    }

    /// Returns `true` if the event is of concrete type `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.inner.as_any().is::<E>()
    }
}

impl Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("kind", &self.kind())
            .field("sender_id", &self.sender_id())
            .field("chat_id", &self.chat_id())
            .finish()
    }
}

// ============================================================================
// Raw Update
// ============================================================================

/// An incoming update as delivered by the transport.
///
/// The transport decides which kinds an update can be read as. `build`
/// returns `None` when the update cannot be interpreted as `kind`.
pub trait RawUpdate: Send + Sync + 'static {
    /// Builds the typed view of this update for `kind`.
    ///
    /// `self_id` is the identity of the running client, which some event
    /// shapes need (e.g. to tell outgoing messages from incoming ones).
    fn build(&self, kind: EventKind, self_id: i64) -> Option<BoxedEvent>;
}

/// A shareable raw update.
pub type BoxedUpdate = Arc<dyn RawUpdate>;

// ============================================================================
// Event Cache
// ============================================================================

/// Typed views of one raw update, built on demand.
///
/// Exactly one `EventCache` exists per dispatch cycle. Every kind is built
/// at most once, and failed builds are remembered too.
pub struct EventCache {
    update: BoxedUpdate,
    self_id: i64,
    built: Mutex<HashMap<EventKind, Option<BoxedEvent>>>,
}

impl EventCache {
    /// Wraps a raw update for one dispatch cycle.
    pub fn new(update: BoxedUpdate, self_id: i64) -> Self {
        Self {
            update,
            self_id,
            built: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the typed view for `kind`, building it on first access.
    pub fn get(&self, kind: EventKind) -> Option<BoxedEvent> {
        let mut built = self.built.lock();
        built
            .entry(kind)
            .or_insert_with(|| {
                trace!(%kind, "Building typed event view");
                self.update.build(kind, self.self_id)
            })
            .clone()
    }

    /// Returns `true` if the update can be read as `kind`.
    pub fn contains(&self, kind: EventKind) -> bool {
        self.get(kind).is_some()
    }

    /// Returns the identity of the running client.
    pub fn self_id(&self) -> i64 {
        self.self_id
    }

    /// Returns the kinds that have been requested so far.
    pub fn built_kinds(&self) -> Vec<EventKind> {
        self.built.lock().keys().copied().collect()
    }
}

impl fmt::Debug for EventCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCache")
            .field("self_id", &self.self_id)
            .field("built", &self.built_kinds())
            .finish_non_exhaustive()
    }
}
