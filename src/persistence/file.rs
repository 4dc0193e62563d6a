//! File-backed storage area for sharing state between processes.
//!
//! Each key lives in `<dir>/<key>.json`, replaced atomically through a
//! temporary file and a rename. Other processes' writes are noticed by a
//! polling task started on the first [`KeyValueStore::watch`] call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{KeyValueStore, StorageEvent};
use crate::error::QueueError;

/// Default interval between polls of watched keys.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What this handle last knew about one key.
#[derive(Debug, Default)]
struct Observed {
    value: Option<String>,
    /// Bumped by every write through this handle. A poll whose read spans
    /// a bump is discarded.
    generation: u64,
}

#[derive(Debug)]
struct FileState {
    dir: PathBuf,
    /// Last content seen or written per key; polling compares against it.
    observed: Mutex<HashMap<String, Observed>>,
    events: broadcast::Sender<StorageEvent>,
}

impl FileState {
    fn path_for(&self, key: &str) -> Result<PathBuf, QueueError> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(QueueError::InvalidConfig(format!(
                "unusable storage key {key:?}"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Applies `write` to disk and records its result as this handle's own,
    /// all under the `observed` lock so no poll can compare in between.
    fn write_through(
        &self,
        key: &str,
        value: Option<String>,
        write: impl FnOnce() -> Result<(), QueueError>,
    ) -> Result<(), QueueError> {
        let mut observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        write()?;
        let entry = observed.entry(key.to_string()).or_default();
        entry.value = value;
        entry.generation = entry.generation.wrapping_add(1);
        Ok(())
    }

    /// Compares every watched key with disk and announces the ones that
    /// changed since they were last seen by this handle.
    async fn poll_once(&self) {
        let keys: Vec<(String, u64)> = {
            let observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
            observed
                .iter()
                .map(|(key, seen)| (key.clone(), seen.generation))
                .collect()
        };

        for (key, generation) in keys {
            let Ok(path) = self.path_for(&key) else {
                continue;
            };
            let current = match tokio::fs::read_to_string(&path).await {
                Ok(content) => Some(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    tracing::warn!(key, error = %e, "storage poll failed");
                    continue;
                }
            };

            let changed = {
                let mut observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(seen) = observed.get_mut(&key) else {
                    continue;
                };
                if seen.generation != generation || seen.value == current {
                    false
                } else {
                    seen.value.clone_from(&current);
                    true
                }
            };
            if changed {
                tracing::debug!(key, "storage record changed on disk");
                let _ = self.events.send(StorageEvent {
                    key,
                    new_value: current,
                    origin: None,
                });
            }
        }
    }
}

/// Storage area persisted as JSON files in one directory.
///
/// One instance belongs to one context. Its own writes are remembered so
/// that the poller only reports writes made by somebody else.
#[derive(Debug)]
pub struct FileStorage {
    state: Arc<FileState>,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl FileStorage {
    /// Opens (creating if needed) the storage directory.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the directory cannot be
    /// created.
    pub fn open(dir: impl AsRef<Path>, poll_interval: Duration) -> Result<Self, QueueError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let (events, _) = broadcast::channel(super::memory::DEFAULT_EVENT_CAPACITY);
        Ok(Self {
            state: Arc::new(FileState {
                dir,
                observed: Mutex::new(HashMap::new()),
                events,
            }),
            poll_interval,
            poller: Mutex::new(None),
        })
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.state.dir
    }

    fn ensure_poller(&self) -> bool {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.is_some() {
            return true;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no async runtime; file storage changes will not be signalled");
            return false;
        };

        let state = Arc::downgrade(&self.state);
        let period = self.poll_interval.max(Duration::from_millis(10));
        *poller = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(state) = state.upgrade() else {
                    break;
                };
                state.poll_once().await;
            }
        }));
        true
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = poller.take() {
            handle.abort();
        }
    }
}

impl KeyValueStore for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, QueueError> {
        let path = self.state.path_for(key)?;
        let value = match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut observed = self.state.observed.lock().unwrap_or_else(PoisonError::into_inner);
        observed.entry(key.to_string()).or_insert_with(|| Observed {
            value: value.clone(),
            generation: 0,
        });
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), QueueError> {
        let path = self.state.path_for(key)?;
        let tmp = self
            .state
            .dir
            .join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, value)?;
        self.state.write_through(key, Some(value.to_string()), || {
            std::fs::rename(&tmp, &path).map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                QueueError::from(e)
            })
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), QueueError> {
        let path = self.state.path_for(key)?;
        self.state
            .write_through(key, None, || match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            })
    }

    fn watch(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        if self.ensure_poller() {
            Some(self.state.events.subscribe())
        } else {
            None
        }
    }
}
