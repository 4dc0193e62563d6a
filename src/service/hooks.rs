//! Post-commit hooks run after a customer is called.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::audio::AudioCue;
use crate::domain::{Ticket, WindowId};

/// Cues launched once per committed call, after persistence, fan-out and
/// observer delivery. Each runs on its own task; nobody awaits it.
#[derive(Debug, Default, Clone)]
pub struct CallHooks {
    cues: Vec<Arc<dyn AudioCue>>,
}

impl CallHooks {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cue.
    #[must_use]
    pub fn with_cue(mut self, cue: Arc<dyn AudioCue>) -> Self {
        self.cues.push(cue);
        self
    }

    /// Number of registered cues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Returns `true` if no cue is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Launches every cue for `ticket` called to `window`.
    ///
    /// Failures are logged inside the spawned task. Without an async
    /// runtime the cues are skipped. The handles are returned for callers
    /// that want to observe completion; the store drops them.
    pub fn fire(&self, ticket: &Ticket, window: WindowId) -> Vec<JoinHandle<()>> {
        if self.cues.is_empty() {
            return Vec::new();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(ticket = %ticket.queue_number, "no async runtime; call cue skipped");
            return Vec::new();
        };

        self.cues
            .iter()
            .map(|cue| {
                let playback = cue.notify_called();
                let label = ticket.queue_number.clone();
                runtime.spawn(async move {
                    if let Err(e) = playback.await {
                        tracing::warn!(ticket = %label, %window, error = %e, "failed to play call cue");
                    }
                })
            })
            .collect()
    }
}
