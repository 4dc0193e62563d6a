//! Execution-context identity.
//!
//! Every context opened from a profile draws a random [`ContextId`]. It
//! tags each peer envelope and storage event the context produces, which
//! is how a listener tells its own writes from everyone else's.

use std::fmt;

/// Identity of one execution context (tab, window, process).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextId(uuid::Uuid);

impl ContextId {
    /// Draws a fresh random id.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.simple(), f)
    }
}
