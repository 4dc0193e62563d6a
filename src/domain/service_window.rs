//! Service windows: the counters customers are called to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a service window.
///
/// Assigned at bootstrap (`1..=N`) and stable for the lifetime of the
/// stored snapshot, resets included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(u32);

impl WindowId {
    /// Wraps a raw window number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw window number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WindowId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Whether a window is free or busy with a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStatus {
    /// Free to call the next customer.
    Available,
    /// Currently serving the customer named in `current_customer`.
    Serving,
}

/// One service point.
///
/// Invariant: `current_customer` is `Some` iff `status` is
/// [`WindowStatus::Serving`]. Only the queue label of the served ticket is
/// kept; the ticket itself leaves the snapshot when it is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWindow {
    /// Stable window identifier.
    pub id: WindowId,
    /// Display label, e.g. `"Window 3"`.
    #[serde(rename = "window_name")]
    pub name: String,
    /// Availability.
    pub status: WindowStatus,
    /// Queue label of the customer being served, if any.
    #[serde(default)]
    pub current_customer: Option<String>,
}

impl ServiceWindow {
    /// Creates an available window.
    #[must_use]
    pub fn new(id: WindowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: WindowStatus::Available,
            current_customer: None,
        }
    }

    /// Creates the default `"Window N"` window for `id`.
    #[must_use]
    pub fn numbered(id: u32) -> Self {
        Self::new(WindowId::new(id), format!("Window {id}"))
    }

    /// Moves the window to `serving` with the given queue label.
    pub fn start_serving(&mut self, queue_number: impl Into<String>) {
        self.status = WindowStatus::Serving;
        self.current_customer = Some(queue_number.into());
    }

    /// Moves the window back to `available`.
    pub fn release(&mut self) {
        self.status = WindowStatus::Available;
        self.current_customer = None;
    }

    /// Returns `true` while a customer is being served.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.status == WindowStatus::Serving
    }

    /// Returns `true` if status and `current_customer` agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.is_serving() == self.current_customer.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serving_round_trip() {
        let mut window = ServiceWindow::numbered(2);
        assert_eq!(window.name, "Window 2");
        assert!(!window.is_serving());

        window.start_serving("A001");
        assert!(window.is_serving());
        assert_eq!(window.current_customer.as_deref(), Some("A001"));
        assert!(window.is_consistent());

        window.release();
        assert_eq!(window.status, WindowStatus::Available);
        assert!(window.current_customer.is_none());
        assert!(window.is_consistent());
    }

    #[test]
    fn serializes_with_stored_field_names() {
        let window = ServiceWindow::numbered(1);
        let Ok(value) = serde_json::to_value(&window) else {
            panic!("serialization failed");
        };
        assert_eq!(
            value,
            serde_json::json!({
                "id": 1,
                "window_name": "Window 1",
                "status": "available",
                "current_customer": null
            })
        );
    }

    #[test]
    fn inconsistent_window_detected() {
        let mut window = ServiceWindow::numbered(1);
        window.status = WindowStatus::Serving;
        assert!(!window.is_consistent());
    }
}
