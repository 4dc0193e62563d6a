//! Same-origin broadcast channel between contexts.
//!
//! [`BroadcastChannel`] wraps a [`tokio::sync::broadcast`] ring shared by
//! every context of a profile under one channel name. Each context talks
//! to it through its own [`BroadcastLink`], which never hears its own
//! messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::messages::{Envelope, PeerMessage};
use super::{PeerNotifier, SnapshotHandler};
use crate::domain::{ContextId, QueueSnapshot};

/// Default channel name for queue updates.
pub const DEFAULT_CHANNEL_NAME: &str = "queue_updates";

/// Default ring capacity. Lagging receivers skip old updates; only the
/// latest snapshot matters to a display.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Named broadcast ring shared by the contexts of one profile.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    name: Arc<str>,
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl BroadcastChannel {
    /// Creates a channel with the given name and ring capacity.
    #[must_use]
    pub fn new(name: &str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: Arc::from(name),
            sender,
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens a link for the context `origin`.
    #[must_use]
    pub fn link(&self, origin: ContextId) -> BroadcastLink {
        BroadcastLink {
            channel: self.clone(),
            origin,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of listening links across all contexts.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One context's end of a [`BroadcastChannel`].
#[derive(Debug)]
pub struct BroadcastLink {
    channel: BroadcastChannel,
    origin: ContextId,
    closed: AtomicBool,
}

impl BroadcastLink {
    /// Posts a message to every other listening context.
    ///
    /// Returns the number of receivers the message reached, including this
    /// link's own listener (which discards it). Posting with no listeners,
    /// or after [`PeerNotifier::close`], silently drops the message.
    pub fn post(&self, message: PeerMessage) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        self.channel
            .sender
            .send(Arc::new(Envelope {
                origin: self.origin,
                message,
            }))
            .unwrap_or(0)
    }

    /// Context this link posts as.
    #[must_use]
    pub fn origin(&self) -> ContextId {
        self.origin
    }
}

impl PeerNotifier for BroadcastLink {
    fn backend(&self) -> &'static str {
        "broadcast_channel"
    }

    fn publish(&self, snapshot: &QueueSnapshot) {
        let reached = self.post(PeerMessage::StateUpdate {
            state: snapshot.clone(),
        });
        tracing::trace!(channel = self.channel.name(), reached, "state update posted");
    }

    fn on_receive(&self, handler: SnapshotHandler) -> Option<JoinHandle<()>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                channel = self.channel.name(),
                "no async runtime; broadcast updates will not be received"
            );
            return None;
        };

        let mut rx = self.channel.sender.subscribe();
        let origin = self.origin;
        let name = Arc::clone(&self.channel.name);
        Some(runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if envelope.origin == origin {
                            continue;
                        }
                        match &envelope.message {
                            PeerMessage::StateUpdate { state } => handler(state.clone()),
                            PeerMessage::Unknown => {
                                tracing::trace!(channel = %name, "ignoring unknown message");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(channel = %name, lagged = n, "link lagged behind channel");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::mpsc;

    fn snapshot(next_number: u32) -> QueueSnapshot {
        let mut s = QueueSnapshot::bootstrap(2, Utc::now());
        s.next_number = next_number;
        s
    }

    fn forwarding_handler() -> (SnapshotHandler, mpsc::UnboundedReceiver<QueueSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: SnapshotHandler = Arc::new(move |s: QueueSnapshot| {
            let _ = tx.send(s);
        });
        (handler, rx)
    }

    #[test]
    fn post_without_receivers_returns_zero() {
        let channel = BroadcastChannel::new(DEFAULT_CHANNEL_NAME, 8);
        let link = channel.link(ContextId::new());
        assert_eq!(link.post(PeerMessage::Unknown), 0);
    }

    #[test]
    fn on_receive_without_runtime_degrades() {
        let channel = BroadcastChannel::new(DEFAULT_CHANNEL_NAME, 8);
        let link = channel.link(ContextId::new());
        let (handler, _rx) = forwarding_handler();
        assert!(link.on_receive(handler).is_none());
    }

    #[tokio::test]
    async fn other_context_receives_update() {
        let channel = BroadcastChannel::new(DEFAULT_CHANNEL_NAME, 8);
        let sender = channel.link(ContextId::new());
        let receiver = channel.link(ContextId::new());
        let (handler, mut rx) = forwarding_handler();
        let Some(task) = receiver.on_receive(handler) else {
            panic!("runtime present");
        };

        sender.publish(&snapshot(7));
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        let Ok(Some(got)) = got else {
            panic!("expected snapshot");
        };
        assert_eq!(got.next_number, 7);
        task.abort();
    }

    #[tokio::test]
    async fn link_does_not_hear_itself() {
        let channel = BroadcastChannel::new(DEFAULT_CHANNEL_NAME, 8);
        let link = channel.link(ContextId::new());
        let (handler, mut rx) = forwarding_handler();
        let Some(task) = link.on_receive(handler) else {
            panic!("runtime present");
        };

        assert_eq!(link.post(PeerMessage::StateUpdate { state: snapshot(3) }), 1);
        let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(got.is_err());
        task.abort();
    }

    #[test]
    fn closed_link_drops_posts() {
        let channel = BroadcastChannel::new(DEFAULT_CHANNEL_NAME, 8);
        let link = channel.link(ContextId::new());
        let _rx = channel.sender.subscribe();
        link.close();
        assert_eq!(link.post(PeerMessage::Unknown), 0);
        assert_eq!(channel.receiver_count(), 1);
    }
}
