//! Figures derived from a snapshot for operator and display boards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::service_window::WindowId;
use super::snapshot::QueueSnapshot;

/// Rough service time per waiting customer, in tenths of a minute.
const MINUTES_PER_CUSTOMER_TENTHS: u64 = 25;

/// Summary counters shown on both boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tickets waiting in the queue.
    pub waiting_count: usize,
    /// Windows currently serving a customer.
    pub serving_count: usize,
    /// Coarse wait estimate: 0 for an empty queue, otherwise
    /// `max(1, floor(waiting * 2.5))` minutes.
    pub estimated_wait_minutes: u64,
}

/// A `(window, customer)` pair for the "now serving" panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowServing {
    /// Window identifier.
    pub window_id: WindowId,
    /// Window display label.
    pub window_name: String,
    /// Queue label of the customer at that window.
    pub queue_number: String,
}

/// Wait estimate for `waiting` customers.
#[must_use]
pub fn estimated_wait_minutes(waiting: usize) -> u64 {
    if waiting == 0 {
        return 0;
    }
    let waiting = u64::try_from(waiting).unwrap_or(u64::MAX);
    (waiting.saturating_mul(MINUTES_PER_CUSTOMER_TENTHS) / 10).max(1)
}

impl QueueSnapshot {
    /// Computes the board counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let waiting_count = self.queue.len();
        QueueStats {
            waiting_count,
            serving_count: self.windows.iter().filter(|w| w.is_serving()).count(),
            estimated_wait_minutes: estimated_wait_minutes(waiting_count),
        }
    }

    /// Serving windows in window order.
    #[must_use]
    pub fn now_serving(&self) -> Vec<NowServing> {
        self.windows
            .iter()
            .filter_map(|w| {
                w.current_customer.as_ref().map(|label| NowServing {
                    window_id: w.id,
                    window_name: w.name.clone(),
                    queue_number: label.clone(),
                })
            })
            .collect()
    }

    /// `(label, minutes waited)` for every queued ticket at `now`.
    #[must_use]
    pub fn waiting_times(&self, now: DateTime<Utc>) -> Vec<(String, i64)> {
        self.queue
            .iter()
            .map(|t| (t.queue_number.clone(), t.wait_minutes(now)))
            .collect()
    }
}
