//! cashier-queue demo entry point.
//!
//! Opens an operator context and a public-display context on one profile,
//! runs a short service session from the operator and logs every board
//! update the display receives.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use cashier_queue::config::QueueConfig;
use cashier_queue::domain::{QueueSnapshot, WindowId};
use cashier_queue::profile::Profile;

/// Time given to peer listeners to drain before shutdown.
const SETTLE: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = QueueConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        backend = ?config.storage_backend,
        windows = config.window_count,
        "starting cashier-queue"
    );

    // Open contexts
    let profile = Profile::from_config(config)?;
    let display = profile.open_context()?;
    let operator = profile.open_context()?;

    let board = display.subscribe(|snapshot: &QueueSnapshot| -> anyhow::Result<()> {
        let stats = snapshot.stats();
        let serving: Vec<String> = snapshot
            .now_serving()
            .into_iter()
            .map(|s| format!("{}={}", s.window_name, s.queue_number))
            .collect();
        tracing::info!(
            waiting = stats.waiting_count,
            serving = stats.serving_count,
            estimated_wait_minutes = stats.estimated_wait_minutes,
            next_number = snapshot.next_number,
            now_serving = %serving.join(", "),
            "board updated"
        );
        Ok(())
    });

    // Service session
    for _ in 0..3 {
        let ticket = operator.add_customer()?;
        tracing::info!(ticket = %ticket.queue_number, "ticket printed");
    }

    let window = WindowId::new(2);
    if let Some(ticket) = operator.call_next_customer(window)? {
        tracing::info!(ticket = %ticket.queue_number, %window, "please proceed");
    }
    tokio::time::sleep(SETTLE).await;

    operator.complete_service(window)?;
    operator.reset_queue()?;
    tokio::time::sleep(SETTLE).await;

    // Shutdown
    board.unsubscribe();
    operator.shutdown();
    display.shutdown();
    tracing::info!("cashier-queue finished");

    Ok(())
}
