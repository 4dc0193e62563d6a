//! Observer registry for one context.
//!
//! [`NotificationHub`] delivers snapshots synchronously, in subscription
//! order, to every subscribed [`SnapshotObserver`]. A failing or panicking
//! observer is logged and skipped; the rest still receive the snapshot.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::domain::QueueSnapshot;

thread_local! {
    static DELIVERY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Receives snapshots. Implemented for any
/// `Fn(&QueueSnapshot) -> anyhow::Result<()>` closure.
///
/// Observers run on the notifying thread and must not mutate the store
/// from inside the callback; such calls are rejected. Defer the mutation
/// instead, e.g. with `tokio::spawn`.
pub trait SnapshotObserver: Send + Sync {
    /// Handles one snapshot.
    ///
    /// # Errors
    ///
    /// Any error is logged by the hub and does not affect other observers.
    fn on_snapshot(&self, snapshot: &QueueSnapshot) -> anyhow::Result<()>;
}

impl<F> SnapshotObserver for F
where
    F: Fn(&QueueSnapshot) -> anyhow::Result<()> + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &QueueSnapshot) -> anyhow::Result<()> {
        self(snapshot)
    }
}

/// Marks the current thread as delivering for the guard's lifetime.
struct DeliveryGuard;

impl DeliveryGuard {
    fn enter() -> Self {
        DELIVERY_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERY_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(u64, Arc<dyn SnapshotObserver>)>,
}

/// Ordered set of observers with isolated, synchronous delivery.
#[derive(Default)]
pub struct NotificationHub {
    registry: Mutex<Registry>,
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl NotificationHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `true` while the current thread is inside an observer
    /// callback of any hub.
    #[must_use]
    pub fn is_delivering() -> bool {
        DELIVERY_DEPTH.with(Cell::get) > 0
    }

    /// Adds `observer` and, if `current` is given, delivers it to the new
    /// observer before returning.
    pub fn subscribe(
        self: &Arc<Self>,
        observer: Arc<dyn SnapshotObserver>,
        current: Option<&QueueSnapshot>,
    ) -> Subscription {
        let id = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            registry.observers.push((id, Arc::clone(&observer)));
            id
        };

        if let Some(snapshot) = current {
            let _guard = DeliveryGuard::enter();
            deliver(id, observer.as_ref(), snapshot);
        }

        Subscription {
            hub: Arc::downgrade(self),
            id,
        }
    }

    /// Delivers `snapshot` to every observer, in subscription order.
    ///
    /// Returns how many observers handled it without error.
    pub fn notify(&self, snapshot: &QueueSnapshot) -> usize {
        let observers: Vec<(u64, Arc<dyn SnapshotObserver>)> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .observers
                .iter()
                .map(|(id, o)| (*id, Arc::clone(o)))
                .collect()
        };

        let _guard = DeliveryGuard::enter();
        observers
            .iter()
            .filter(|(id, observer)| deliver(*id, observer.as_ref(), snapshot))
            .count()
    }

    /// Number of subscribed observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .len()
    }

    /// Drops every observer.
    pub fn clear(&self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .clear();
    }

    fn remove(&self, id: u64) -> bool {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.observers.len();
        registry.observers.retain(|(oid, _)| *oid != id);
        registry.observers.len() != before
    }
}

fn deliver(id: u64, observer: &dyn SnapshotObserver, snapshot: &QueueSnapshot) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.on_snapshot(snapshot))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(observer = id, error = %e, "error in state listener");
            false
        }
        Err(payload) => {
            tracing::error!(
                observer = id,
                panic = panic_message(payload.as_ref()),
                "state listener panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Handle returned by [`NotificationHub::subscribe`].
///
/// Dropping it unsubscribes; [`Subscription::detach`] keeps the observer
/// for the life of the hub.
#[must_use = "dropping a Subscription unsubscribes its observer"]
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<NotificationHub>,
    id: u64,
}

impl Subscription {
    /// Observer id, as used in log fields.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the observer. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(hub) = self.hub.upgrade()
            && hub.remove(self.id)
        {
            tracing::trace!(observer = self.id, "observer unsubscribed");
        }
    }

    /// Returns `true` while the observer is still subscribed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let Some(hub) = self.hub.upgrade() else {
            return false;
        };
        let registry = hub.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.observers.iter().any(|(id, _)| *id == self.id)
    }

    /// Keeps the observer subscribed after this handle is dropped.
    pub fn detach(mut self) {
        self.hub = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
