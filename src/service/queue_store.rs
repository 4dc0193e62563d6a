//! Queue store: the mutation and subscription API of one context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;

use super::hooks::CallHooks;
use crate::domain::{ContextId, DEFAULT_WINDOW_COUNT, QueueSnapshot, Ticket, WindowId};
use crate::error::QueueError;
use crate::notify::{NotificationHub, SnapshotObserver, Subscription};
use crate::persistence::PersistentStore;
use crate::sync::{PeerNotifier, SnapshotHandler};

/// Single source of truth for queue state within one context.
///
/// Every mutation follows the same fixed sequence: load the snapshot,
/// compute the next one, save it, publish it to peer contexts, notify
/// local observers, and only then run post-commit hooks. Mutations in one
/// context are serialized; across contexts the storage area is the only
/// arbiter and the last write wins.
#[derive(Debug)]
pub struct QueueStore {
    context: ContextId,
    persistent: PersistentStore,
    hub: Arc<NotificationHub>,
    peers: Vec<Arc<dyn PeerNotifier>>,
    hooks: CallHooks,
    write_lock: Mutex<()>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Builder for [`QueueStore`].
#[derive(Debug)]
pub struct QueueStoreBuilder {
    context: ContextId,
    persistent: PersistentStore,
    peers: Vec<Arc<dyn PeerNotifier>>,
    hooks: CallHooks,
    window_count: u32,
}

impl QueueStoreBuilder {
    /// Adds a peer backend.
    #[must_use]
    pub fn peer(mut self, peer: Arc<dyn PeerNotifier>) -> Self {
        self.peers.push(peer);
        self
    }

    /// Sets the post-commit hooks for calls.
    #[must_use]
    pub fn hooks(mut self, hooks: CallHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Number of windows created if the snapshot has to be bootstrapped.
    #[must_use]
    pub fn window_count(mut self, window_count: u32) -> Self {
        self.window_count = window_count;
        self
    }

    /// Bootstraps the snapshot if none is stored, then starts listening to
    /// peer contexts.
    ///
    /// An unreadable storage area does not prevent construction; the
    /// failure is logged and every later operation reports it.
    #[must_use]
    pub fn build(self) -> QueueStore {
        let store = QueueStore {
            context: self.context,
            persistent: self.persistent,
            hub: NotificationHub::new(),
            peers: self.peers,
            hooks: self.hooks,
            write_lock: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        };
        store.initialize(self.window_count);
        store.attach_peers();
        store
    }
}

impl QueueStore {
    /// Local-only store with the default window count and no hooks.
    #[must_use]
    pub fn new(context: ContextId, persistent: PersistentStore) -> Self {
        Self::builder(context, persistent).build()
    }

    /// Starts building a store for `context` over `persistent`.
    #[must_use]
    pub fn builder(context: ContextId, persistent: PersistentStore) -> QueueStoreBuilder {
        QueueStoreBuilder {
            context,
            persistent,
            peers: Vec::new(),
            hooks: CallHooks::new(),
            window_count: DEFAULT_WINDOW_COUNT,
        }
    }

    /// Context this store belongs to.
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Underlying snapshot record.
    #[must_use]
    pub fn persistent(&self) -> &PersistentStore {
        &self.persistent
    }

    /// Local observer hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    fn initialize(&self, window_count: u32) {
        match self.persistent.load() {
            Ok(Some(_)) => {
                tracing::debug!(context = %self.context, "existing queue state found");
                return;
            }
            Ok(None) => {}
            Err(e @ (QueueError::Serialization(_) | QueueError::CorruptSnapshot(_))) => {
                tracing::warn!(context = %self.context, error = %e, "discarding unreadable queue state");
            }
            Err(e) => {
                tracing::error!(context = %self.context, error = %e, "error reading queue state");
                return;
            }
        }

        let snapshot = QueueSnapshot::bootstrap(window_count, Utc::now());
        match self.persistent.save(snapshot) {
            Ok(committed) => {
                self.publish(&committed);
                tracing::info!(context = %self.context, windows = window_count, "queue state bootstrapped");
            }
            Err(e) => {
                tracing::error!(context = %self.context, error = %e, "error saving queue state");
            }
        }
    }

    fn attach_peers(&self) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for peer in &self.peers {
            let hub = Arc::clone(&self.hub);
            let handler: SnapshotHandler = Arc::new(move |snapshot: QueueSnapshot| {
                let _ = hub.notify(&snapshot);
            });
            match peer.on_receive(handler) {
                Some(task) => {
                    tracing::debug!(context = %self.context, backend = peer.backend(), "peer listener attached");
                    listeners.push(task);
                }
                None => {
                    tracing::debug!(context = %self.context, backend = peer.backend(), "peer backend not listening; local-only");
                }
            }
        }
    }

    fn publish(&self, snapshot: &QueueSnapshot) {
        for peer in &self.peers {
            peer.publish(snapshot);
        }
    }

    /// Runs one read-modify-write. `apply` returns `Ok(None)` when there is
    /// nothing to do; then nothing is saved, published or notified.
    fn mutate<T>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut QueueSnapshot) -> Result<Option<T>, QueueError>,
    ) -> Result<Option<(T, QueueSnapshot)>, QueueError> {
        if NotificationHub::is_delivering() {
            return Err(QueueError::ReentrantMutation(op));
        }

        let _write = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = self.persistent.load()?.ok_or(QueueError::StateMissing)?;
        let Some(out) = apply(&mut snapshot)? else {
            return Ok(None);
        };

        let committed = self.persistent.save(snapshot)?;
        self.publish(&committed);
        self.hub.notify(&committed);
        Ok(Some((out, committed)))
    }

    fn report(&self, op: &'static str, err: &QueueError) {
        if err.is_storage_fault() {
            tracing::error!(context = %self.context, op, code = err.error_code(), error = %err, "queue operation failed");
        } else {
            tracing::warn!(context = %self.context, op, code = err.error_code(), error = %err, "queue operation rejected");
        }
    }

    /// Issues the next ticket and appends it to the queue.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be read or written,
    /// or [`QueueError::ReentrantMutation`] when called from an observer.
    pub fn add_customer(&self) -> Result<Ticket, QueueError> {
        let result = self
            .mutate("add_customer", |snapshot| {
                Ok(Some(snapshot.issue_ticket(Utc::now())))
            })
            .and_then(|done| {
                done.map(|(ticket, _)| ticket)
                    .ok_or_else(|| QueueError::Internal("ticket was not issued".to_string()))
            });

        match &result {
            Ok(ticket) => {
                tracing::info!(context = %self.context, ticket = %ticket.queue_number, "customer added");
            }
            Err(e) => self.report("add_customer", e),
        }
        result
    }

    /// Calls the head of the queue to `window_id`.
    ///
    /// Returns `Ok(None)` when nobody is waiting; nothing changes and no
    /// observer is notified. On success the call cues are launched after
    /// observers have seen the new state, and are never awaited.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownWindow`] (queue untouched) for a window
    /// that does not exist, a storage error if the snapshot cannot be read
    /// or written, or [`QueueError::ReentrantMutation`] when called from an
    /// observer.
    pub fn call_next_customer(&self, window_id: WindowId) -> Result<Option<Ticket>, QueueError> {
        let result = self
            .mutate("call_next_customer", |snapshot| snapshot.call_next(window_id))
            .map(|done| done.map(|(ticket, _)| ticket));

        match &result {
            Ok(Some(ticket)) => {
                tracing::info!(context = %self.context, ticket = %ticket.queue_number, window = %window_id, "customer called");
                let _ = self.hooks.fire(ticket, window_id);
            }
            Ok(None) => {
                tracing::debug!(context = %self.context, window = %window_id, "no customers in queue");
            }
            Err(e) => self.report("call_next_customer", e),
        }
        result
    }

    /// Frees `window_id`.
    ///
    /// Returns `Ok(true)` if the window was found. An unknown window is not
    /// an error: the snapshot is re-saved unchanged, observers are
    /// notified, and `Ok(false)` is returned.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be read or written,
    /// or [`QueueError::ReentrantMutation`] when called from an observer.
    pub fn complete_service(&self, window_id: WindowId) -> Result<bool, QueueError> {
        let result = self
            .mutate("complete_service", |snapshot| {
                Ok(Some(snapshot.complete_service(window_id)))
            })
            .map(|done| done.is_some_and(|(found, _)| found));

        match &result {
            Ok(true) => {
                tracing::info!(context = %self.context, window = %window_id, "service completed");
            }
            Ok(false) => {
                tracing::warn!(context = %self.context, window = %window_id, "complete_service on unknown window");
            }
            Err(e) => self.report("complete_service", e),
        }
        result
    }

    /// Empties the queue, frees every window and restarts numbering at 1.
    /// Irreversible.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be read or written,
    /// or [`QueueError::ReentrantMutation`] when called from an observer.
    pub fn reset_queue(&self) -> Result<(), QueueError> {
        let result = self
            .mutate("reset_queue", |snapshot| {
                snapshot.reset();
                Ok(Some(()))
            })
            .map(|_| ());

        match &result {
            Ok(()) => tracing::info!(context = %self.context, "queue reset"),
            Err(e) => self.report("reset_queue", e),
        }
        result
    }

    /// Reads the current snapshot without side effects.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be read or decoded.
    pub fn snapshot(&self) -> Result<Option<QueueSnapshot>, QueueError> {
        self.persistent
            .load()
            .inspect_err(|e| self.report("snapshot", e))
    }

    /// Subscribes `observer`, delivering the current snapshot to it before
    /// returning when one exists.
    pub fn subscribe(&self, observer: impl SnapshotObserver + 'static) -> Subscription {
        let current = self.snapshot().ok().flatten();
        self.hub.subscribe(Arc::new(observer), current.as_ref())
    }

    /// Stops peer listeners, closes peer backends and drops all observers.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let listeners = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in listeners {
            task.abort();
        }
        for peer in &self.peers {
            peer.close();
        }
        self.hub.clear();
        tracing::debug!(context = %self.context, "queue store shut down");
    }
}

impl Drop for QueueStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
