//! Queue configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Missing or malformed values fall back to defaults, except
//! the storage backend name and the window count, which are validated.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::DEFAULT_WINDOW_COUNT;
use crate::error::QueueError;
use crate::persistence::DEFAULT_STORAGE_KEY;
use crate::persistence::file::DEFAULT_POLL_INTERVAL;
use crate::persistence::memory::{DEFAULT_EVENT_CAPACITY, DEFAULT_QUOTA_BYTES};
use crate::sync::broadcast_link::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHANNEL_NAME};

/// Where a profile keeps its storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Process-local, quota-limited map.
    #[default]
    Memory,
    /// One JSON file per key in a directory, shared between processes.
    File,
}

impl FromStr for StorageBackend {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(QueueError::InvalidConfig(format!(
                "unknown storage backend '{other}' (expected 'memory' or 'file')"
            ))),
        }
    }
}

/// Top-level queue configuration.
///
/// Loaded once at startup via [`QueueConfig::from_env`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Storage area kind.
    pub storage_backend: StorageBackend,

    /// Directory of the file backend.
    pub storage_dir: PathBuf,

    /// Key of the snapshot record.
    pub storage_key: String,

    /// Byte quota of the memory backend.
    pub storage_quota_bytes: usize,

    /// Ring capacity of the memory backend's change events.
    pub storage_event_capacity: usize,

    /// Change-polling interval of the file backend.
    pub storage_poll_interval: Duration,

    /// Name of the broadcast channel.
    pub channel_name: String,

    /// Ring capacity of the broadcast channel.
    pub channel_capacity: usize,

    /// Whether contexts publish on the broadcast channel.
    pub broadcast_enabled: bool,

    /// Whether contexts listen to storage change events.
    pub storage_events_enabled: bool,

    /// Windows created on first run.
    pub window_count: u32,

    /// Whether calls ring the terminal chime.
    pub audio_enabled: bool,

    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            storage_dir: PathBuf::from(".queue-state"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_quota_bytes: DEFAULT_QUOTA_BYTES,
            storage_event_capacity: DEFAULT_EVENT_CAPACITY,
            storage_poll_interval: DEFAULT_POLL_INTERVAL,
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            broadcast_enabled: true,
            storage_events_enabled: true,
            window_count: DEFAULT_WINDOW_COUNT,
            audio_enabled: true,
            log_json: false,
        }
    }
}

impl QueueConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if `QUEUE_STORAGE_BACKEND`
    /// names an unknown backend or `QUEUE_WINDOW_COUNT` is zero.
    pub fn from_env() -> Result<Self, QueueError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`QueueConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, QueueError> {
        let defaults = Self::default();

        let storage_backend = match lookup("QUEUE_STORAGE_BACKEND") {
            Some(name) => name.parse()?,
            None => defaults.storage_backend,
        };

        let window_count = parse_var(&lookup, "QUEUE_WINDOW_COUNT", defaults.window_count);
        if window_count == 0 {
            return Err(QueueError::InvalidConfig(
                "QUEUE_WINDOW_COUNT must be at least 1".to_string(),
            ));
        }

        let poll_ms = parse_var(
            &lookup,
            "QUEUE_STORAGE_POLL_MS",
            u64::try_from(defaults.storage_poll_interval.as_millis()).unwrap_or(500),
        );

        Ok(Self {
            storage_backend,
            storage_dir: lookup("QUEUE_STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from),
            storage_key: lookup("QUEUE_STORAGE_KEY").unwrap_or(defaults.storage_key),
            storage_quota_bytes: parse_var(
                &lookup,
                "QUEUE_STORAGE_QUOTA_BYTES",
                defaults.storage_quota_bytes,
            ),
            storage_event_capacity: parse_var(
                &lookup,
                "QUEUE_STORAGE_EVENT_CAPACITY",
                defaults.storage_event_capacity,
            ),
            storage_poll_interval: Duration::from_millis(poll_ms.max(1)),
            channel_name: lookup("QUEUE_CHANNEL_NAME").unwrap_or(defaults.channel_name),
            channel_capacity: parse_var(
                &lookup,
                "QUEUE_CHANNEL_CAPACITY",
                defaults.channel_capacity,
            ),
            broadcast_enabled: parse_var_bool(
                &lookup,
                "QUEUE_BROADCAST_ENABLED",
                defaults.broadcast_enabled,
            ),
            storage_events_enabled: parse_var_bool(
                &lookup,
                "QUEUE_STORAGE_EVENTS_ENABLED",
                defaults.storage_events_enabled,
            ),
            window_count,
            audio_enabled: parse_var_bool(&lookup, "QUEUE_AUDIO_ENABLED", defaults.audio_enabled),
            log_json: parse_var_bool(&lookup, "QUEUE_LOG_JSON", defaults.log_json),
        })
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_var_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tokio_test::{assert_err, assert_ok};

    fn load(vars: &[(&str, &str)]) -> Result<QueueConfig, QueueError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        QueueConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = assert_ok!(load(&[]));
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.storage_key, "cashier_queue_state");
        assert_eq!(config.channel_name, "queue_updates");
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.storage_event_capacity, 64);
        assert_eq!(config.window_count, 5);
        assert_eq!(config.storage_poll_interval, Duration::from_millis(500));
        assert!(config.broadcast_enabled && config.storage_events_enabled);
        assert!(!config.log_json);
    }

    #[test]
    fn reads_overrides() {
        let config = assert_ok!(load(&[
            ("QUEUE_STORAGE_BACKEND", "File"),
            ("QUEUE_STORAGE_DIR", "/tmp/q"),
            ("QUEUE_WINDOW_COUNT", "3"),
            ("QUEUE_BROADCAST_ENABLED", "0"),
            ("QUEUE_AUDIO_ENABLED", "FALSE"),
            ("QUEUE_STORAGE_POLL_MS", "50"),
            ("QUEUE_CHANNEL_CAPACITY", "8"),
            ("QUEUE_STORAGE_EVENT_CAPACITY", "256"),
        ]));
        assert_eq!(config.storage_backend, StorageBackend::File);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/q"));
        assert_eq!(config.window_count, 3);
        assert!(!config.broadcast_enabled);
        assert!(!config.audio_enabled);
        assert_eq!(config.storage_poll_interval, Duration::from_millis(50));
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.storage_event_capacity, 256);
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let config = assert_ok!(load(&[
            ("QUEUE_CHANNEL_CAPACITY", "lots"),
            ("QUEUE_LOG_JSON", "maybe"),
        ]));
        assert_eq!(config.channel_capacity, 64);
        assert!(!config.log_json);
    }

    #[test]
    fn rejects_unknown_backend_and_zero_windows() {
        let backend = assert_err!(load(&[("QUEUE_STORAGE_BACKEND", "redis")]));
        assert!(matches!(backend, QueueError::InvalidConfig(_)));

        let windows = assert_err!(load(&[("QUEUE_WINDOW_COUNT", "0")]));
        assert!(matches!(windows, QueueError::InvalidConfig(_)));
    }
}
