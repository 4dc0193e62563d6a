//! Queue error types with stable numeric codes.
//!
//! [`QueueError`] is the single error type crossing the public API. No
//! fault raised inside the crate escapes as a panic; every operation
//! resolves to a `Result` the caller must inspect.

use crate::domain::WindowId;

/// Error enum for every fallible queue operation.
///
/// # Error Code Ranges
///
/// | Range     | Category        |
/// |-----------|-----------------|
/// | 1000–1999 | Configuration   |
/// | 2000–2999 | State/Not Found |
/// | 3000–3999 | Storage         |
/// | 4000–4999 | Usage           |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The storage area could not be read or written (unavailable, quota).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The snapshot could not be encoded or decoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The stored snapshot decoded but violates a queue invariant.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// No snapshot exists under the queue key (cleared externally).
    #[error("queue state is missing from storage")]
    StateMissing,

    /// The requested service window is not part of the snapshot.
    #[error("unknown service window: {0}")]
    UnknownWindow(WindowId),

    /// A mutation was attempted from inside an observer callback.
    #[error("mutation `{0}` attempted during observer notification")]
    ReentrantMutation(&'static str),

    /// A configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidConfig(_) => 1001,
            Self::StateMissing => 2001,
            Self::UnknownWindow(_) => 2002,
            Self::Internal(_) => 3000,
            Self::StorageUnavailable(_) => 3001,
            Self::Serialization(_) => 3002,
            Self::CorruptSnapshot(_) => 3003,
            Self::ReentrantMutation(_) => 4001,
        }
    }

    /// Returns `true` for failures of the storage area itself, as opposed
    /// to caller mistakes.
    #[must_use]
    pub const fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::Serialization(_)
                | Self::CorruptSnapshot(_)
                | Self::StateMissing
        )
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_ranges() {
        assert_eq!(QueueError::InvalidConfig(String::new()).error_code(), 1001);
        assert_eq!(QueueError::StateMissing.error_code(), 2001);
        assert_eq!(QueueError::UnknownWindow(WindowId::new(9)).error_code(), 2002);
        assert_eq!(
            QueueError::StorageUnavailable("quota".to_string()).error_code(),
            3001
        );
        assert_eq!(QueueError::ReentrantMutation("reset").error_code(), 4001);
    }

    #[test]
    fn json_error_maps_to_serialization() {
        let Err(err) = serde_json::from_str::<u32>("not json") else {
            panic!("expected parse failure");
        };
        let mapped = QueueError::from(err);
        assert!(matches!(mapped, QueueError::Serialization(_)));
        assert!(mapped.is_storage_fault());
    }

    #[test]
    fn display_mentions_window() {
        let err = QueueError::UnknownWindow(WindowId::new(7));
        assert_eq!(err.to_string(), "unknown service window: 7");
        assert!(!err.is_storage_fault());
    }
}
