//! Service layer: the queue store and its post-commit hooks.
//!
//! [`QueueStore`] owns the read-modify-write cycle of one context and
//! fans committed snapshots out through the [`crate::sync`] backends and
//! the local [`crate::notify::NotificationHub`].

pub mod hooks;
pub mod queue_store;

pub use hooks::CallHooks;
pub use queue_store::{QueueStore, QueueStoreBuilder};
