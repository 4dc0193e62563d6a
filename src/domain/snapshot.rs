//! The queue snapshot and its pure state transitions.
//!
//! [`QueueSnapshot`] is the single persisted and broadcast unit. The
//! methods here compute the next snapshot in memory; loading, saving and
//! fan-out are the job of [`crate::service::QueueStore`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::service_window::{ServiceWindow, WindowId};
use super::ticket::Ticket;
use crate::error::QueueError;

/// Number of windows created by a default bootstrap.
pub const DEFAULT_WINDOW_COUNT: u32 = 5;

/// Complete queue and window state at one instant.
///
/// Stored as `{ queue, windows, nextNumber, lastUpdated, lastTicketId }`,
/// with `lastUpdated` in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Waiting tickets in arrival order; the head is called next.
    pub queue: Vec<Ticket>,
    /// Fixed set of service windows.
    pub windows: Vec<ServiceWindow>,
    /// Sequence number of the next ticket; 1 after bootstrap or reset.
    #[serde(rename = "nextNumber")]
    pub next_number: u32,
    /// Stamped on every save. Diagnostic only, never used to merge.
    #[serde(rename = "lastUpdated", with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
    /// Id of the most recently issued ticket, kept across calls and resets
    /// so ids never repeat. Absent in older records.
    #[serde(rename = "lastTicketId", default)]
    pub last_ticket_id: i64,
}

impl QueueSnapshot {
    /// First-run state: empty queue, `window_count` available windows
    /// named `Window 1..N`, numbering from 1.
    #[must_use]
    pub fn bootstrap(window_count: u32, now: DateTime<Utc>) -> Self {
        Self {
            queue: Vec::new(),
            windows: (1..=window_count).map(ServiceWindow::numbered).collect(),
            next_number: 1,
            last_updated: now,
            last_ticket_id: 0,
        }
    }

    /// Appends a new waiting ticket labelled from `next_number` and
    /// advances the counter.
    pub fn issue_ticket(&mut self, now: DateTime<Utc>) -> Ticket {
        let floor = self
            .queue
            .last()
            .map_or(self.last_ticket_id, |tail| tail.id.max(self.last_ticket_id));
        let id = now.timestamp_millis().max(floor.saturating_add(1));
        self.last_ticket_id = id;

        let ticket = Ticket::new(id, self.next_number, now);
        self.queue.push(ticket.clone());
        self.next_number = self.next_number.saturating_add(1);
        ticket
    }

    /// Pops the head of the queue onto `window_id`.
    ///
    /// Returns `Ok(None)` without touching anything when the queue is
    /// empty. A window that is already serving is overwritten with the new
    /// customer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownWindow`] if no window has `window_id`;
    /// the queue is left intact in that case.
    pub fn call_next(&mut self, window_id: WindowId) -> Result<Option<Ticket>, QueueError> {
        if self.queue.is_empty() {
            return Ok(None);
        }
        let Some(window) = self.windows.iter_mut().find(|w| w.id == window_id) else {
            return Err(QueueError::UnknownWindow(window_id));
        };

        let ticket = self.queue.remove(0);
        window.start_serving(ticket.queue_number.clone());
        Ok(Some(ticket))
    }

    /// Frees `window_id`. Returns `false` if no such window exists, in
    /// which case nothing changes.
    pub fn complete_service(&mut self, window_id: WindowId) -> bool {
        match self.windows.iter_mut().find(|w| w.id == window_id) {
            Some(window) => {
                window.release();
                true
            }
            None => false,
        }
    }

    /// Starts a new epoch: empty queue, every window available, numbering
    /// from 1. Window identities and names are kept.
    pub fn reset(&mut self) {
        self.queue.clear();
        for window in &mut self.windows {
            window.release();
        }
        self.next_number = 1;
    }

    /// Looks up a window by id.
    #[must_use]
    pub fn window(&self, window_id: WindowId) -> Option<&ServiceWindow> {
        self.windows.iter().find(|w| w.id == window_id)
    }

    /// Checks the structural invariants of a snapshot read from storage.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CorruptSnapshot`] naming the first violation:
    /// a zero counter, duplicate window ids, a window whose status and
    /// customer disagree, or a duplicated queue label.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.next_number == 0 {
            return Err(QueueError::CorruptSnapshot(
                "nextNumber must be positive".to_string(),
            ));
        }

        let mut window_ids = HashSet::with_capacity(self.windows.len());
        for window in &self.windows {
            if !window_ids.insert(window.id) {
                return Err(QueueError::CorruptSnapshot(format!(
                    "duplicate window id {}",
                    window.id
                )));
            }
            if !window.is_consistent() {
                return Err(QueueError::CorruptSnapshot(format!(
                    "window {} status disagrees with current customer",
                    window.id
                )));
            }
        }

        let mut labels = HashSet::with_capacity(self.queue.len());
        for ticket in &self.queue {
            if !labels.insert(ticket.queue_number.as_str()) {
                return Err(QueueError::CorruptSnapshot(format!(
                    "ticket {} queued twice",
                    ticket.queue_number
                )));
            }
        }
        Ok(())
    }
}
