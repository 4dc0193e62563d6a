//! Persistence layer: key-value storage areas and the snapshot record.
//!
//! A [`KeyValueStore`] is the analogue of a browser storage area: string
//! keys, string values, synchronous access, and a change signal other
//! contexts can watch. [`PersistentStore`] keeps the one JSON snapshot
//! record on top of it.

pub mod file;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::domain::{ContextId, QueueSnapshot};
use crate::error::QueueError;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Default key of the snapshot record.
pub const DEFAULT_STORAGE_KEY: &str = "cashier_queue_state";

/// Change notification emitted by a storage area after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed.
    pub key: String,
    /// New raw value; `None` when the key was removed.
    pub new_value: Option<String>,
    /// Context that performed the write, when the backend knows it.
    pub origin: Option<ContextId>,
}

/// Synchronous string key-value storage shared by the contexts of a
/// profile.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the area cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the area cannot be
    /// written or the write would exceed its quota.
    fn set_item(&self, key: &str, value: &str) -> Result<(), QueueError>;

    /// Deletes a value. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the area cannot be
    /// written.
    fn remove_item(&self, key: &str) -> Result<(), QueueError>;

    /// Subscribes to change events, or `None` if this backend cannot
    /// signal changes in the current environment.
    fn watch(&self) -> Option<broadcast::Receiver<StorageEvent>>;
}

/// Current instant truncated to the millisecond precision the record
/// stores, so a saved snapshot equals its reloaded copy.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// The snapshot record: one JSON value under a fixed key.
#[derive(Debug, Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl PersistentStore {
    /// Wraps `backend`, storing the snapshot under `key`.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Returns the record key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the underlying storage area.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Reads the current snapshot, `None` if the record is absent.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the area cannot be read,
    /// [`QueueError::Serialization`] if the record is not a snapshot, or
    /// [`QueueError::CorruptSnapshot`] if it breaks an invariant.
    pub fn load(&self) -> Result<Option<QueueSnapshot>, QueueError> {
        match self.backend.get_item(&self.key)? {
            Some(raw) => Self::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Stamps `lastUpdated` and writes the snapshot, returning what was
    /// written. Last write wins; nothing is merged.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Serialization`] if encoding fails or
    /// [`QueueError::StorageUnavailable`] if the write is refused.
    pub fn save(&self, mut snapshot: QueueSnapshot) -> Result<QueueSnapshot, QueueError> {
        snapshot.last_updated = now_millis();
        let raw = serde_json::to_string(&snapshot)?;
        self.backend.set_item(&self.key, &raw)?;
        Ok(snapshot)
    }

    /// Deletes the record, as an external "clear site data" would.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the area refuses.
    pub fn clear(&self) -> Result<(), QueueError> {
        self.backend.remove_item(&self.key)
    }

    /// Parses and validates a raw record.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Serialization`] for malformed JSON and
    /// [`QueueError::CorruptSnapshot`] for invariant violations.
    pub fn decode(raw: &str) -> Result<QueueSnapshot, QueueError> {
        let snapshot: QueueSnapshot = serde_json::from_str(raw)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::WindowId;

    fn store() -> PersistentStore {
        PersistentStore::new(Arc::new(MemoryStorage::default()), DEFAULT_STORAGE_KEY)
    }

    #[test]
    fn load_absent_is_none() {
        assert_eq!(store().load(), Ok(None));
    }

    #[test]
    fn save_then_load_is_lossless() {
        let store = store();
        let mut snapshot = QueueSnapshot::bootstrap(5, Utc::now());
        let _ = snapshot.issue_ticket(Utc::now());
        let _ = snapshot.issue_ticket(Utc::now());
        let _ = snapshot.call_next(WindowId::new(3));

        let Ok(saved) = store.save(snapshot) else {
            panic!("save failed");
        };
        let Ok(Some(loaded)) = store.load() else {
            panic!("load failed");
        };
        assert_eq!(loaded, saved);
    }

    #[test]
    fn save_of_load_only_moves_timestamp() {
        let store = store();
        let Ok(first) = store.save(QueueSnapshot::bootstrap(2, Utc::now())) else {
            panic!("save failed");
        };
        let Ok(Some(loaded)) = store.load() else {
            panic!("load failed");
        };
        let Ok(second) = store.save(loaded) else {
            panic!("save failed");
        };
        assert_eq!(second.queue, first.queue);
        assert_eq!(second.windows, first.windows);
        assert_eq!(second.next_number, first.next_number);
        assert!(second.last_updated >= first.last_updated);
    }

    #[test]
    fn reads_record_in_interop_format() {
        let backend = Arc::new(MemoryStorage::default());
        let raw = r#"{"queue":[{"id":1709284500000,"queue_number":"A004","timestamp":"2024-03-01T09:15:00.000Z","status":"waiting"}],"windows":[{"id":1,"window_name":"Window 1","status":"serving","current_customer":"A003"},{"id":2,"window_name":"Window 2","status":"available","current_customer":null}],"nextNumber":5,"lastUpdated":1709284512345}"#;
        let Ok(()) = backend.set_item(DEFAULT_STORAGE_KEY, raw) else {
            panic!("seed failed");
        };
        let store = PersistentStore::new(backend, DEFAULT_STORAGE_KEY);

        let Ok(Some(snapshot)) = store.load() else {
            panic!("load failed");
        };
        assert_eq!(snapshot.next_number, 5);
        assert_eq!(snapshot.last_ticket_id, 0);
        assert_eq!(snapshot.last_updated.timestamp_millis(), 1_709_284_512_345);
        assert_eq!(
            snapshot
                .window(WindowId::new(1))
                .and_then(|w| w.current_customer.as_deref()),
            Some("A003")
        );
    }

    #[test]
    fn malformed_record_is_serialization_error() {
        let backend = Arc::new(MemoryStorage::default());
        let Ok(()) = backend.set_item(DEFAULT_STORAGE_KEY, "{not json") else {
            panic!("seed failed");
        };
        let store = PersistentStore::new(backend, DEFAULT_STORAGE_KEY);
        assert!(matches!(store.load(), Err(QueueError::Serialization(_))));
    }

    #[test]
    fn clear_removes_record() {
        let store = store();
        let _ = store.save(QueueSnapshot::bootstrap(1, Utc::now()));
        assert!(store.clear().is_ok());
        assert_eq!(store.load(), Ok(None));
    }
}
