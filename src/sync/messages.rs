//! Cross-context message types.

use serde::{Deserialize, Serialize};

use crate::domain::{ContextId, QueueSnapshot};

/// Message posted on the queue broadcast channel.
///
/// Wire form: `{ "type": "state_update", "state": { ...snapshot } }`.
/// Messages with any other `type` decode as [`PeerMessage::Unknown`] and
/// are ignored by receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// A context committed a new snapshot.
    StateUpdate {
        /// The committed snapshot.
        state: QueueSnapshot,
    },
    /// Any message type this build does not understand.
    #[serde(other)]
    Unknown,
}

impl PeerMessage {
    /// Returns the message type as a static string slice.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::StateUpdate { .. } => "state_update",
            Self::Unknown => "unknown",
        }
    }
}

/// A message together with the context that posted it.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Posting context; a link never delivers its own envelopes.
    pub origin: ContextId,
    /// The message itself.
    pub message: PeerMessage,
}
