//! FSM Bot Example
//!
//! A three-step questionnaire (name, age, pet) driven by a [`StateGroup`].
//! Two users answer at the same time; each chat/user pair keeps its own
//! state in its [`UserCage`].
//!
//! ```text
//! /start ──▶ Form.name ──▶ Form.age ──▶ Form.pet ──▶ (free)
//!                            │  ▲
//!                            └──┘ "Age must be a number"
//! ```
//!
//! Updates are scripted through a [`ChannelClient`]; replies are logged and
//! printed once the client disconnects.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package fsm-bot
//! ```

use std::any::Any;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tracing::info;
use trellis::core::TransportResult;
use trellis::prelude::*;

// ============================================================================
// Transport
// ============================================================================

/// A plain text message.
#[derive(Debug, Clone)]
struct TextMessage {
    chat: i64,
    user: i64,
    text: String,
}

impl EventTrait for TextMessage {
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

impl RawUpdate for TextMessage {
    fn build(&self, kind: EventKind, _self_id: i64) -> Option<BoxedEvent> {
        (kind == EventKind::NewMessage).then(|| BoxedEvent::new(self.clone()))
    }
}

/// A [`ChannelClient`] that records what the bot says.
struct DemoClient {
    inbox: Arc<ChannelClient>,
    transcript: Mutex<Vec<(i64, String)>>,
}

impl DemoClient {
    fn reply(&self, chat: i64, text: impl Into<String>) {
        let text = text.into();
        info!(chat, "bot: {}", text);
        self.transcript.lock().push((chat, text));
    }
}

#[async_trait]
impl Client for DemoClient {
    async fn next_update(&self) -> Option<BoxedUpdate> {
        self.inbox.next_update().await
    }

    async fn self_id(&self) -> TransportResult<i64> {
        self.inbox.self_id().await
    }

    fn is_connected(&self) -> bool {
        self.inbox.is_connected()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn reply(client: &BoxedClient, chat: i64, text: impl Into<String>) {
    if let Some(demo) = client.as_any().downcast_ref::<DemoClient>() {
        demo.reply(chat, text);
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn questionnaire(form: &StateGroup) -> Result<Router> {
    let name = form.member("name").context("Form has no 'name' state")?;
    let age = form.member("age").context("Form has no 'age' state")?;
    let pet = form.member("pet").context("Form has no 'pet' state")?;
    let router = Router::new().named("questionnaire");

    router.on_new_message([text::commands(["start"]), state::entry()], {
        let name = name.clone();
        move |cage: UserCage, client: BoxedClient, ChatId(chat): ChatId| {
            let name = name.clone();
            async move {
                cage.set_state(&name).await?;
                reply(&client, chat, "What's your name?");
                Ok::<_, HandlerError>(())
            }
        }
    })?;

    router.on_new_message(
        [state::exact(&name)],
        |cage: UserCage,
         client: BoxedClient,
         CurrentMember(member): CurrentMember,
         Event(msg): Event<TextMessage>| async move {
            cage.update_data(json!({ "name": msg.text })).await?;
            cage.set_state(member.next()?).await?;
            reply(
                &client,
                msg.chat,
                format!("Nice to meet you, {}. How old are you?", msg.text),
            );
            Ok::<_, HandlerError>(())
        },
    )?;

    router.on_new_message(
        [state::exact(&age), text::is_digit()],
        |cage: UserCage,
         client: BoxedClient,
         CurrentMember(member): CurrentMember,
         Event(msg): Event<TextMessage>| async move {
            let years: u32 = msg.text.parse().map_err(HandlerError::new)?;
            cage.update_fields([("age", years)]).await?;
            cage.set_state(member.next()?).await?;
            reply(&client, msg.chat, "Cat or Dog?");
            Ok::<_, HandlerError>(())
        },
    )?;

    router.on_new_message(
        [state::exact(&age), !text::is_digit()],
        |client: BoxedClient, ChatId(chat): ChatId| async move {
            reply(&client, chat, "Age must be a number");
        },
    )?;

    router.on_new_message(
        [state::exact(&pet), text::between(["Cat", "Dog"])],
        |cage: UserCage, client: BoxedClient, Event(msg): Event<TextMessage>| async move {
            cage.update_fields([("pet", msg.text.as_str())]).await?;
            let data = cage.get_data().await?;
            reply(
                &client,
                msg.chat,
                format!(
                    "{} is {} and has a {}",
                    data["name"].as_str().unwrap_or_default(),
                    data["age"],
                    data["pet"].as_str().unwrap_or_default()
                ),
            );
            cage.free().await?;
            Ok::<_, HandlerError>(())
        },
    )?;

    router.on_new_message(
        [state::exact(&pet)],
        |client: BoxedClient, ChatId(chat): ChatId| async move {
            reply(&client, chat, "Please answer Cat or Dog");
        },
    )?;

    Ok(router)
}

/// Logs every message before the questionnaire sees it.
fn logging_router() -> Result<Router> {
    let router = Router::new().named("logging");
    router.on_new_message([], |Event(msg): Event<TextMessage>| async move {
        info!(chat = msg.chat, user = msg.user, "user: {}", msg.text);
        Flow::Skip
    })?;
    Ok(router)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ConfigLoader::new().load()?;
    // One scripted conversation per user only reads well in arrival order.
    config.dispatch.mode = DispatchMode::Sequential;

    let form = StateGroup::from_states("Form", ["name", "age", "pet"])?;
    let root = Router::new().named("root");
    root.include(&logging_router()?)?;
    root.include(&questionnaire(&form)?)?;

    let (inbox, sender) = ChannelClient::new(1);
    let client = Arc::new(DemoClient {
        inbox,
        transcript: Mutex::new(Vec::new()),
    });

    let script = [
        (100, "/start"),
        (200, "/start"),
        (100, "Alice"),
        (200, "Bob"),
        (100, "twelve"),
        (100, "12"),
        (200, "30"),
        (200, "Hamster"),
        (100, "Cat"),
        (200, "Dog"),
    ];
    for (user, text) in script {
        sender.send(Arc::new(TextMessage {
            chat: user,
            user,
            text: text.to_owned(),
        }))?;
    }
    drop(sender);

    let runner = Runner::from_config(client.clone(), root, &config)?;
    runner.run().await?;

    for (chat, text) in client.transcript.lock().iter() {
        println!("[{chat}] {text}");
    }
    Ok(())
}
