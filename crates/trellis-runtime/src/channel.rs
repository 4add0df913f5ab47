//! An in-memory client backed by a tokio channel.
//!
//! Useful for tests, demos, and for bridging a transport that pushes updates
//! from its own task:
//!
//! ```rust,ignore
//! let (client, sender) = ChannelClient::new(42);
//! tokio::spawn(async move {
//!     sender.send(update)?;
//!     // dropping the last sender disconnects the client
//! });
//! Runner::new(client, dispatcher).run().await?;
//! ```

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_core::{BoxedUpdate, Client, TransportError, TransportResult};

/// Pushes updates into a [`ChannelClient`].
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::UnboundedSender<BoxedUpdate>,
}

impl UpdateSender {
    /// Queues an update. Fails once the client has been closed.
    pub fn send(&self, update: BoxedUpdate) -> TransportResult<()> {
        self.tx.send(update).map_err(|_| TransportError::Disconnected)
    }

    /// Returns `true` once the client has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A [`Client`] fed through an [`UpdateSender`].
///
/// It disconnects when every sender is dropped and the queue is drained, or
/// when [`close`](Self::close) is called.
pub struct ChannelClient {
    self_id: i64,
    rx: Mutex<mpsc::UnboundedReceiver<BoxedUpdate>>,
    connected: AtomicBool,
    closed: CancellationToken,
}

impl ChannelClient {
    pub fn new(self_id: i64) -> (Arc<Self>, UpdateSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            self_id,
            rx: Mutex::new(rx),
            connected: AtomicBool::new(true),
            closed: CancellationToken::new(),
        });
        (client, UpdateSender { tx })
    }

    /// Disconnects immediately, waking a pending `next_update`. Queued
    /// updates are dropped.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.cancel();
        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
        }
    }
}

#[async_trait]
impl Client for ChannelClient {
    async fn next_update(&self) -> Option<BoxedUpdate> {
        if !self.is_connected() {
            return None;
        }
        let mut rx = self.rx.lock().await;
        let next = tokio::select! {
            _ = self.closed.cancelled() => None,
            next = rx.recv() => next,
        };
        if self.closed.is_cancelled() {
            rx.close();
        }
        if next.is_none() && self.connected.swap(false, Ordering::SeqCst) {
            debug!(self_id = self.self_id, "Channel client disconnected");
        }
        next
    }

    async fn self_id(&self) -> TransportResult<i64> {
        Ok(self.self_id)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{BoxedEvent, EventKind, RawUpdate};

    struct Nothing;

    impl RawUpdate for Nothing {
        fn build(&self, _kind: EventKind, _self_id: i64) -> Option<BoxedEvent> {
            None
        }
    }

    #[tokio::test]
    async fn test_disconnects_when_senders_drop() {
        let (client, sender) = ChannelClient::new(7);
        sender.send(Arc::new(Nothing)).unwrap();
        drop(sender);

        assert!(client.next_update().await.is_some());
        assert!(client.is_connected());
        assert!(client.next_update().await.is_none());
        assert!(!client.is_connected());
        assert_eq!(client.self_id().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_close_rejects_further_updates() {
        let (client, sender) = ChannelClient::new(7);
        client.close();

        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(Arc::new(Nothing)),
            Err(TransportError::Disconnected)
        ));
        assert!(client.next_update().await.is_none());
    }
}
