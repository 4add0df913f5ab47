#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use trellis_core::{
    BoxedClient, BoxedEvent, BoxedUpdate, Client, Event, EventCache, EventKind, RawUpdate,
    TransportResult,
};
use trellis_framework::{DispatchEnv, DispatchOutcome, Router};
use trellis_storage::{BoxedStorage, MemoryStorage};

pub const SELF_ID: i64 = 1;

/// A message-like event; the same shape serves every kind in tests.
#[derive(Debug, Clone)]
pub struct TestEvent {
    pub kind: EventKind,
    pub chat: Option<i64>,
    pub user: Option<i64>,
    pub text: String,
    pub data: Vec<u8>,
}

impl Event for TestEvent {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn sender_id(&self) -> Option<i64> {
        self.user
    }

    fn chat_id(&self) -> Option<i64> {
        self.chat
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn query_data(&self) -> Option<&[u8]> {
        (self.kind == EventKind::CallbackQuery).then_some(self.data.as_slice())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An update readable as the kinds listed in `kinds`.
pub struct TestUpdate {
    pub kinds: Vec<EventKind>,
    pub chat: Option<i64>,
    pub user: Option<i64>,
    pub text: String,
    pub data: Vec<u8>,
}

impl RawUpdate for TestUpdate {
    fn build(&self, kind: EventKind, _self_id: i64) -> Option<BoxedEvent> {
        self.kinds.contains(&kind).then(|| {
            BoxedEvent::new(TestEvent {
                kind,
                chat: self.chat,
                user: self.user,
                text: self.text.clone(),
                data: self.data.clone(),
            })
        })
    }
}

pub fn message(chat: i64, user: i64, text: &str) -> BoxedUpdate {
    Arc::new(TestUpdate {
        kinds: vec![EventKind::NewMessage],
        chat: Some(chat),
        user: Some(user),
        text: text.to_owned(),
        data: Vec::new(),
    })
}

pub fn callback(chat: i64, user: i64, data: &str) -> BoxedUpdate {
    Arc::new(TestUpdate {
        kinds: vec![EventKind::CallbackQuery],
        chat: Some(chat),
        user: Some(user),
        text: String::new(),
        data: data.as_bytes().to_vec(),
    })
}

pub struct TestClient;

#[async_trait]
impl Client for TestClient {
    async fn next_update(&self) -> Option<BoxedUpdate> {
        None
    }

    async fn self_id(&self) -> TransportResult<i64> {
        Ok(SELF_ID)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn storage() -> BoxedStorage {
    Arc::new(MemoryStorage::new())
}

pub fn env(storage: BoxedStorage) -> DispatchEnv {
    let client: BoxedClient = Arc::new(TestClient);
    DispatchEnv::new(storage, client)
}

pub async fn dispatch(router: &Router, env: &DispatchEnv, update: BoxedUpdate) -> DispatchOutcome {
    let events = EventCache::new(update, SELF_ID);
    router.notify(&events, env).await
}
