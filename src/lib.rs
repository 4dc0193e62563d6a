//! # cashier-queue
//!
//! Queue-management state engine shared between operator and display
//! contexts.
//!
//! One snapshot record (waiting tickets, service windows, next ticket
//! number) lives in a key-value storage area. Every context opened from a
//! [`profile::Profile`] gets its own [`service::QueueStore`], which
//! mutates the record, tells the other contexts about it, and notifies its
//! local observers.
//!
//! ## Architecture
//!
//! ```text
//! Operator / Display contexts
//!     │
//!     ├── QueueStore (service/)  ── CallHooks ── AudioCue (audio/)
//!     │
//!     ├── NotificationHub (notify/)
//!     ├── PeerNotifier (sync/)
//!     │     ├── BroadcastLink
//!     │     └── StorageSignal
//!     │
//!     ├── QueueSnapshot (domain/)
//!     │
//!     └── PersistentStore (persistence/)
//!           ├── MemoryStorage
//!           └── FileStorage
//! ```

pub mod audio;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod profile;
pub mod service;
pub mod sync;
