//! Shared profile: one storage area plus one broadcast channel namespace.
//!
//! Every [`QueueStore`] opened from the same [`Profile`] is an independent
//! execution context that observes the others through the peer backends
//! enabled in [`QueueConfig`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::TerminalChime;
use crate::config::{QueueConfig, StorageBackend};
use crate::domain::ContextId;
use crate::error::QueueError;
use crate::persistence::{FileStorage, KeyValueStore, MemoryStorage, PersistentStore};
use crate::service::{CallHooks, QueueStore};
use crate::sync::{BroadcastChannel, StorageSignal};

#[derive(Debug)]
enum StorageArea {
    Memory(MemoryStorage),
    File {
        dir: PathBuf,
        poll_interval: Duration,
    },
}

/// Storage area and broadcast channel shared by a set of contexts.
#[derive(Debug)]
pub struct Profile {
    config: QueueConfig,
    area: StorageArea,
    channel: BroadcastChannel,
}

impl Profile {
    /// Profile backed by a process-local, quota-limited storage area.
    #[must_use]
    pub fn in_memory(config: QueueConfig) -> Self {
        let area = StorageArea::Memory(MemoryStorage::new(
            config.storage_quota_bytes,
            config.storage_event_capacity,
        ));
        Self::with_area(config, area)
    }

    /// Profile backed by one JSON file per key under `config.storage_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the directory cannot be
    /// created.
    pub fn on_disk(config: QueueConfig) -> Result<Self, QueueError> {
        std::fs::create_dir_all(&config.storage_dir)?;
        let area = StorageArea::File {
            dir: config.storage_dir.clone(),
            poll_interval: config.storage_poll_interval,
        };
        Ok(Self::with_area(config, area))
    }

    /// Profile with the backend named in `config`.
    ///
    /// # Errors
    ///
    /// Same as [`Profile::on_disk`] for the file backend.
    pub fn from_config(config: QueueConfig) -> Result<Self, QueueError> {
        match config.storage_backend {
            StorageBackend::Memory => Ok(Self::in_memory(config)),
            StorageBackend::File => Self::on_disk(config),
        }
    }

    fn with_area(config: QueueConfig, area: StorageArea) -> Self {
        let channel = BroadcastChannel::new(&config.channel_name, config.channel_capacity);
        tracing::debug!(channel = channel.name(), key = %config.storage_key, "profile created");
        Self {
            config,
            area,
            channel,
        }
    }

    /// Configuration the profile was built from.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Broadcast channel shared by the profile's contexts.
    #[must_use]
    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    fn storage_for(&self, context: ContextId) -> Result<Arc<dyn KeyValueStore>, QueueError> {
        Ok(match &self.area {
            StorageArea::Memory(root) => Arc::new(root.for_context(context)),
            StorageArea::File { dir, poll_interval } => {
                Arc::new(FileStorage::open(dir, *poll_interval)?)
            }
        })
    }

    /// Opens a new execution context with its own store.
    ///
    /// The snapshot is bootstrapped if the profile has none yet. Peer
    /// listeners start only under a tokio runtime; without one the store
    /// still works, local-only.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StorageUnavailable`] if the storage area
    /// cannot be opened for this context.
    pub fn open_context(&self) -> Result<QueueStore, QueueError> {
        let context = ContextId::new();
        let backend = self.storage_for(context)?;
        let persistent = PersistentStore::new(Arc::clone(&backend), self.config.storage_key.clone());

        let mut builder =
            QueueStore::builder(context, persistent).window_count(self.config.window_count);
        if self.config.broadcast_enabled {
            builder = builder.peer(Arc::new(self.channel.link(context)));
        }
        if self.config.storage_events_enabled {
            builder = builder.peer(Arc::new(StorageSignal::new(
                backend,
                self.config.storage_key.clone(),
                context,
            )));
        }
        if self.config.audio_enabled {
            builder = builder.hooks(CallHooks::new().with_cue(Arc::new(TerminalChime::stdout())));
        }

        let store = builder.build();
        tracing::info!(context = %context, "context opened");
        Ok(store)
    }
}
