//! Storage-change signal as a peer backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{PeerNotifier, SnapshotHandler};
use crate::domain::{ContextId, QueueSnapshot};
use crate::persistence::{KeyValueStore, PersistentStore};

/// Relays changes of the snapshot record made by other contexts.
///
/// Publishing is a no-op: the write to the storage area is itself the
/// signal. Events for other keys, removals, and events this context
/// caused are skipped.
#[derive(Debug)]
pub struct StorageSignal {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    origin: ContextId,
    closed: AtomicBool,
}

impl StorageSignal {
    /// Watches `key` on `backend` on behalf of context `origin`.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>, origin: ContextId) -> Self {
        Self {
            backend,
            key: key.into(),
            origin,
            closed: AtomicBool::new(false),
        }
    }
}

impl PeerNotifier for StorageSignal {
    fn backend(&self) -> &'static str {
        "storage_event"
    }

    fn publish(&self, _snapshot: &QueueSnapshot) {}

    fn on_receive(&self, handler: SnapshotHandler) -> Option<JoinHandle<()>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let Some(mut rx) = self.backend.watch() else {
            tracing::debug!(key = %self.key, "storage area cannot signal changes");
            return None;
        };

        let key = self.key.clone();
        let origin = self.origin;
        Some(runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.key != key || event.origin == Some(origin) {
                            continue;
                        }
                        let Some(raw) = event.new_value else {
                            continue;
                        };
                        match PersistentStore::decode(&raw) {
                            Ok(snapshot) => handler(snapshot),
                            Err(e) => {
                                tracing::error!(key = %key, error = %e, "error handling storage event");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(key = %key, lagged = n, "storage signal lagged");
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
