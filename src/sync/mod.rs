//! Cross-context propagation of committed snapshots.
//!
//! A [`PeerNotifier`] is one way of telling the other contexts of a profile
//! that the snapshot changed. Two backends exist and may run side by side:
//! the [`BroadcastLink`] posts the snapshot on a shared channel, and the
//! [`StorageSignal`] relays the storage area's own change events. The
//! store never depends on which, if any, is present; local observers are
//! always notified directly.

pub mod broadcast_link;
pub mod messages;
pub mod storage_signal;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::domain::QueueSnapshot;

pub use broadcast_link::{BroadcastChannel, BroadcastLink};
pub use messages::{Envelope, PeerMessage};
pub use storage_signal::StorageSignal;

/// Callback fed with snapshots committed by other contexts.
pub type SnapshotHandler = Arc<dyn Fn(QueueSnapshot) + Send + Sync>;

/// Best-effort, unordered fan-out of snapshots between contexts.
pub trait PeerNotifier: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Announces a committed snapshot to the other contexts. Never fails
    /// the caller; undeliverable updates are dropped.
    fn publish(&self, snapshot: &QueueSnapshot);

    /// Starts delivering snapshots from other contexts to `handler`.
    ///
    /// Returns the listener task, or `None` when the backend cannot listen
    /// here (closed, unsupported, or no async runtime). `None` degrades the
    /// context to local-only notification.
    fn on_receive(&self, handler: SnapshotHandler) -> Option<JoinHandle<()>>;

    /// Stops publishing. Listener tasks are owned and aborted by the caller.
    fn close(&self);
}
