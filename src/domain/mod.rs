//! Domain layer: queue snapshot, tickets, windows, and derived figures.
//!
//! Everything here is plain data plus pure transitions. Persistence,
//! cross-context fan-out and observer delivery live in the layers above.

pub mod context_id;
pub mod service_window;
pub mod snapshot;
pub mod stats;
pub mod ticket;

pub use context_id::ContextId;
pub use service_window::{ServiceWindow, WindowId, WindowStatus};
pub use snapshot::{DEFAULT_WINDOW_COUNT, QueueSnapshot};
pub use stats::{NowServing, QueueStats};
pub use ticket::{Ticket, TicketStatus, queue_label};
