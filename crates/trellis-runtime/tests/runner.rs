use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use trellis_core::{
    BoxedClient, BoxedEvent, BoxedUpdate, Client, Event, EventKind, RawUpdate, TransportError,
    TransportResult,
};
use trellis_framework::filters::text;
use trellis_framework::{Flow, HandlerError, Router, StateGroup, UserCage, state};
use trellis_runtime::{
    ChannelClient, DispatchMode, Dispatcher, Runner, RuntimeError, StorageBackend, TrellisConfig,
};
use trellis_storage::{BoxedStorage, Data, JsonStorage, MemoryStorage, Storage, StorageResult};

#[derive(Debug, Clone)]
struct Message {
    chat: i64,
    user: i64,
    text: String,
}

impl Event for Message {
    fn kind(&self) -> EventKind {
        EventKind::NewMessage
    }

    fn sender_id(&self) -> Option<i64> {
        Some(self.user)
    }

    fn chat_id(&self) -> Option<i64> {
        Some(self.chat)
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RawUpdate for Message {
    fn build(&self, kind: EventKind, _self_id: i64) -> Option<BoxedEvent> {
        (kind == EventKind::NewMessage).then(|| BoxedEvent::new(self.clone()))
    }
}

fn message(user: i64, text: &str) -> BoxedUpdate {
    Arc::new(Message {
        chat: 1,
        user,
        text: text.to_owned(),
    })
}

/// Memory storage that counts lifecycle calls.
#[derive(Default)]
struct CountingStorage {
    inner: MemoryStorage,
    inits: AtomicUsize,
    closes: AtomicUsize,
}

impl CountingStorage {
    fn counts(&self) -> (usize, usize) {
        (
            self.inits.load(Ordering::SeqCst),
            self.closes.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn init(&self) -> StorageResult<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }

    async fn get_state(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get_state(key).await
    }

    async fn set_state(&self, key: &str, state: Option<&str>) -> StorageResult<()> {
        self.inner.set_state(key, state).await
    }

    async fn get_data(&self, key: &str) -> StorageResult<Data> {
        self.inner.get_data(key).await
    }

    async fn set_data(&self, key: &str, data: Option<Data>) -> StorageResult<()> {
        self.inner.set_data(key, data).await
    }

    async fn update_data(&self, key: &str, partial: Data) -> StorageResult<()> {
        self.inner.update_data(key, partial).await
    }
}

/// A client that fails in configurable ways.
struct BrokenClient {
    panic_on_update: bool,
}

#[async_trait]
impl Client for BrokenClient {
    async fn next_update(&self) -> Option<BoxedUpdate> {
        if self.panic_on_update {
            panic!("transport exploded");
        }
        None
    }

    async fn self_id(&self) -> TransportResult<i64> {
        if self.panic_on_update {
            Ok(1)
        } else {
            Err(TransportError::identity("not logged in"))
        }
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn echo_router(seen: &Arc<Mutex<Vec<String>>>) -> Router {
    let router = Router::new();
    let seen = seen.clone();
    router
        .on_new_message([], move |msg: trellis_framework::Event<Message>| {
            let seen = seen.clone();
            async move {
                seen.lock().push(msg.text.clone());
            }
        })
        .unwrap();
    router
}

#[tokio::test]
async fn test_storage_lifecycle_on_disconnect() {
    let storage = Arc::new(CountingStorage::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (client, sender) = ChannelClient::new(1);

    for text in ["a", "b", "c"] {
        sender.send(message(2, text)).unwrap();
    }
    drop(sender);

    let dispatcher = Dispatcher::new(echo_router(&seen), storage.clone());
    Runner::new(client, dispatcher)
        .run_until(std::future::pending())
        .await
        .unwrap();

    assert_eq!(storage.counts(), (1, 1));
    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(seen, ["a", "b", "c"]);
}

#[tokio::test]
async fn test_sequential_mode_keeps_arrival_order() {
    let storage: BoxedStorage = Arc::new(MemoryStorage::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (client, sender) = ChannelClient::new(1);

    let texts: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    for text in &texts {
        sender.send(message(2, text)).unwrap();
    }
    drop(sender);

    Runner::new(client, Dispatcher::new(echo_router(&seen), storage))
        .mode(DispatchMode::Sequential)
        .run_until(std::future::pending())
        .await
        .unwrap();

    assert_eq!(*seen.lock(), texts);
}

#[tokio::test]
async fn test_storage_closed_once_when_loop_panics() {
    let storage = Arc::new(CountingStorage::default());
    let client: BoxedClient = Arc::new(BrokenClient {
        panic_on_update: true,
    });

    let err = Runner::new(client, Dispatcher::new(Router::new(), storage.clone()))
        .run_until(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Panicked(ref msg) if msg.contains("transport exploded")));
    assert_eq!(storage.counts(), (1, 1));
}

#[tokio::test]
async fn test_storage_closed_when_identity_fails() {
    let storage = Arc::new(CountingStorage::default());
    let client: BoxedClient = Arc::new(BrokenClient {
        panic_on_update: false,
    });

    let err = Runner::new(client, Dispatcher::new(Router::new(), storage.clone()))
        .run_until(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Transport(TransportError::Identity(_))));
    assert_eq!(storage.counts(), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handler_panic_does_not_stop_the_loop() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new();
    router
        .on_new_message([text::exact("boom")], || async {
            if true {
                panic!("handler exploded");
            }
        })
        .unwrap();
    let recorder = seen.clone();
    router
        .on_new_message([], move |msg: trellis_framework::Event<Message>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().push(msg.text.clone());
            }
        })
        .unwrap();

    let (client, sender) = ChannelClient::new(1);
    sender.send(message(2, "boom")).unwrap();
    sender.send(message(2, "after")).unwrap();
    drop(sender);

    let storage: BoxedStorage = Arc::new(MemoryStorage::new());
    Runner::new(client, Dispatcher::new(router, storage))
        .run_until(std::future::pending())
        .await
        .unwrap();

    assert_eq!(*seen.lock(), ["after"]);
}

#[tokio::test]
async fn test_shutdown_aborts_in_flight_dispatch() {
    let started = Arc::new(tokio::sync::Notify::new());
    let finished = Arc::new(AtomicUsize::new(0));
    let router = Router::new();
    let (notify, done) = (started.clone(), finished.clone());
    router
        .on_new_message([], move || {
            let (notify, done) = (notify.clone(), done.clone());
            async move {
                notify.notify_one();
                tokio::time::sleep(Duration::from_secs(3600)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    let storage = Arc::new(CountingStorage::default());
    let (client, sender) = ChannelClient::new(1);
    sender.send(message(2, "slow")).unwrap();

    let shutdown = {
        let started = started.clone();
        async move { started.notified().await }
    };
    Runner::new(client, Dispatcher::new(router, storage.clone()))
        .run_until(shutdown)
        .await
        .unwrap();

    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(storage.counts(), (1, 1));
    drop(sender);
}

#[tokio::test]
async fn test_conversation_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fsm.json");
    let form = StateGroup::from_states("Form", ["name", "age"]).unwrap();
    let name = form.member("name").unwrap();

    let router = Router::new();
    router
        .on_new_message(
            [text::commands(["start"]), state::entry()],
            move |cage: UserCage| {
                let name = name.clone();
                async move {
                    cage.set_state(&name).await?;
                    Ok::<_, HandlerError>(Flow::Continue)
                }
            },
        )
        .unwrap();

    let (client, sender) = ChannelClient::new(1);
    sender.send(message(2, "/start")).unwrap();
    drop(sender);
    let storage: BoxedStorage = Arc::new(JsonStorage::new(&path));
    Runner::new(client, Dispatcher::new(router, storage))
        .run_until(std::future::pending())
        .await
        .unwrap();

    let reopened: BoxedStorage = Arc::new(JsonStorage::new(&path));
    reopened.init().await.unwrap();
    let cage = UserCage::new(reopened, Some(1), Some(2)).unwrap();
    assert_eq!(cage.get_state().await.unwrap().as_deref(), Some("Form.name"));
}

#[tokio::test]
async fn test_from_config_selects_backend_and_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = TrellisConfig::default();
    config.storage.backend = StorageBackend::Json;
    config.storage.path = dir.path().join("fsm.json");
    config.dispatch.mode = DispatchMode::Sequential;

    let (client, sender) = ChannelClient::new(1);
    drop(sender);
    let runner = Runner::from_config(client, Router::new(), &config).unwrap();
    runner.run_until(std::future::pending()).await.unwrap();

    assert!(config.storage.path.exists());
}
