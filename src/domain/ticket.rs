//! Queue tickets and their display labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of every queue label.
pub const TICKET_PREFIX: char = 'A';

/// Formats a sequence number as a queue label: `A` + at least three
/// zero-padded digits (`7` becomes `A007`, `1234` stays `A1234`).
#[must_use]
pub fn queue_label(number: u32) -> String {
    format!("{TICKET_PREFIX}{number:03}")
}

/// Lifecycle status of a queued ticket.
///
/// A ticket only ever waits inside the snapshot. Once called it leaves the
/// queue and survives only as a label on the serving window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Waiting in the queue.
    Waiting,
}

/// One customer's entry in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Creation time in epoch milliseconds, bumped when needed so ids in
    /// the queue are strictly increasing.
    pub id: i64,
    /// Display label, e.g. `A007`.
    pub queue_number: String,
    /// Instant the ticket was issued.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Always [`TicketStatus::Waiting`] while queued.
    pub status: TicketStatus,
}

impl Ticket {
    /// Issues a waiting ticket.
    #[must_use]
    pub fn new(id: i64, number: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            queue_number: queue_label(number),
            created_at,
            status: TicketStatus::Waiting,
        }
    }

    /// Whole minutes this ticket has been waiting at `now`. Never negative.
    #[must_use]
    pub fn wait_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes().max(0)
    }
}
