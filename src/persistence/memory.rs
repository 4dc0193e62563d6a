//! In-memory storage area shared by every context of a profile.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use super::{KeyValueStore, StorageEvent};
use crate::domain::ContextId;
use crate::error::QueueError;

/// Default quota, matching the usual per-origin `localStorage` budget.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Default capacity of the change-event ring.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
struct MemoryArea {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: usize,
    events: broadcast::Sender<StorageEvent>,
}

/// Handle onto a shared in-memory storage area.
///
/// Every handle writes as one context; [`MemoryStorage::for_context`]
/// gives another context its own handle onto the same area. Writes are
/// announced to all handles as [`StorageEvent`]s carrying the writer's
/// [`ContextId`].
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    area: Arc<MemoryArea>,
    origin: ContextId,
}

impl MemoryStorage {
    /// Creates a fresh area with the given byte quota and event capacity,
    /// returning a handle for a new context.
    #[must_use]
    pub fn new(quota_bytes: usize, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            area: Arc::new(MemoryArea {
                items: Mutex::new(HashMap::new()),
                quota_bytes,
                events,
            }),
            origin: ContextId::new(),
        }
    }

    /// Returns a handle onto the same area that writes as `origin`.
    #[must_use]
    pub fn for_context(&self, origin: ContextId) -> Self {
        Self {
            area: Arc::clone(&self.area),
            origin,
        }
    }

    /// Context this handle writes as.
    #[must_use]
    pub fn origin(&self) -> ContextId {
        self.origin
    }

    /// Bytes currently used by keys and values.
    #[must_use]
    pub fn usage_bytes(&self) -> usize {
        let items = self.area.items.lock().unwrap_or_else(PoisonError::into_inner);
        usage(&items)
    }

    fn announce(&self, key: &str, new_value: Option<String>) {
        let _ = self.area.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin: Some(self.origin),
        });
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_BYTES, DEFAULT_EVENT_CAPACITY)
    }
}

fn usage(items: &HashMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, QueueError> {
        let items = self.area.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), QueueError> {
        {
            let mut items = self.area.items.lock().unwrap_or_else(PoisonError::into_inner);
            let current = usage(&items);
            let replaced = items.get(key).map_or(0, |old| key.len() + old.len());
            let projected = current - replaced + key.len() + value.len();
            if projected > self.area.quota_bytes {
                return Err(QueueError::StorageUnavailable(format!(
                    "quota exceeded: {projected} of {} bytes",
                    self.area.quota_bytes
                )));
            }
            items.insert(key.to_string(), value.to_string());
        }
        self.announce(key, Some(value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), QueueError> {
        let removed = {
            let mut items = self.area.items.lock().unwrap_or_else(PoisonError::into_inner);
            items.remove(key).is_some()
        };
        if removed {
            self.announce(key, None);
        }
        Ok(())
    }

    fn watch(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.area.events.subscribe())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_items() {
        let a = MemoryStorage::default();
        let b = a.for_context(ContextId::new());
        assert!(a.set_item("k", "v").is_ok());
        assert_eq!(b.get_item("k"), Ok(Some("v".to_string())));
        assert_ne!(a.origin(), b.origin());
    }

    #[test]
    fn quota_is_enforced() {
        let storage = MemoryStorage::new(8, 4);
        assert!(storage.set_item("k", "1234567").is_ok());
        assert_eq!(storage.usage_bytes(), 8);

        let result = storage.set_item("k", "12345678");
        assert!(matches!(result, Err(QueueError::StorageUnavailable(_))));
        assert_eq!(storage.get_item("k"), Ok(Some("1234567".to_string())));

        // Replacing with a smaller value frees space.
        assert!(storage.set_item("k", "1").is_ok());
        assert_eq!(storage.usage_bytes(), 2);
    }

    #[tokio::test]
    async fn writes_announce_origin() {
        let a = MemoryStorage::default();
        let b = a.for_context(ContextId::new());
        let Some(mut rx) = b.watch() else {
            panic!("memory storage always watches");
        };

        assert!(a.set_item("k", "v").is_ok());
        let Ok(event) = rx.recv().await else {
            panic!("expected event");
        };
        assert_eq!(event.key, "k");
        assert_eq!(event.new_value.as_deref(), Some("v"));
        assert_eq!(event.origin, Some(a.origin()));

        assert!(a.remove_item("k").is_ok());
        let Ok(event) = rx.recv().await else {
            panic!("expected event");
        };
        assert!(event.new_value.is_none());
    }

    #[test]
    fn removing_missing_key_is_silent() {
        let storage = MemoryStorage::default();
        let Some(mut rx) = storage.watch() else {
            panic!("memory storage always watches");
        };
        assert!(storage.remove_item("nope").is_ok());
        assert!(rx.try_recv().is_err());
    }
}
