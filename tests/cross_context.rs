//! Cross-context scenarios: two contexts of one profile stay in step.
#![allow(clippy::panic)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use cashier_queue::config::{QueueConfig, StorageBackend};
use cashier_queue::domain::{QueueSnapshot, WindowId, WindowStatus};
use cashier_queue::error::QueueError;
use cashier_queue::notify::Subscription;
use cashier_queue::profile::Profile;
use cashier_queue::service::QueueStore;

const WAIT: Duration = Duration::from_secs(2);

fn config(broadcast: bool, storage_events: bool) -> QueueConfig {
    QueueConfig {
        broadcast_enabled: broadcast,
        storage_events_enabled: storage_events,
        audio_enabled: false,
        ..QueueConfig::default()
    }
}

fn open(profile: &Profile) -> QueueStore {
    let Ok(store) = profile.open_context() else {
        panic!("context failed to open");
    };
    store
}

fn watch(store: &QueueStore) -> (Subscription, mpsc::UnboundedReceiver<QueueSnapshot>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = store.subscribe(move |s: &QueueSnapshot| -> anyhow::Result<()> {
        tx.send(s.clone())?;
        Ok(())
    });
    (sub, rx)
}

/// Waits until a delivered snapshot satisfies `pred`.
async fn until(
    rx: &mut mpsc::UnboundedReceiver<QueueSnapshot>,
    mut pred: impl FnMut(&QueueSnapshot) -> bool,
) -> QueueSnapshot {
    let found = tokio::time::timeout(WAIT, async {
        while let Some(snapshot) = rx.recv().await {
            if pred(&snapshot) {
                return Some(snapshot);
            }
        }
        None
    })
    .await;
    let Ok(Some(snapshot)) = found else {
        panic!("expected snapshot never arrived");
    };
    snapshot
}

#[tokio::test]
async fn display_follows_operator_over_broadcast() {
    let profile = Profile::in_memory(config(true, false));
    let display = open(&profile);
    let operator = open(&profile);
    let (_sub, mut rx) = watch(&display);

    let initial = until(&mut rx, |_| true).await;
    assert_eq!(initial.next_number, 1);

    for _ in 0..3 {
        assert!(operator.add_customer().is_ok());
    }
    let seen = until(&mut rx, |s| s.queue.len() == 3).await;
    assert_eq!(seen.next_number, 4);

    let Ok(Some(called)) = operator.call_next_customer(WindowId::new(2)) else {
        panic!("call failed");
    };
    assert_eq!(called.queue_number, "A001");
    let seen = until(&mut rx, |s| s.queue.len() == 2).await;
    let Some(window) = seen.window(WindowId::new(2)) else {
        panic!("window 2 missing");
    };
    assert_eq!(window.status, WindowStatus::Serving);
    assert_eq!(window.current_customer.as_deref(), Some("A001"));
    assert_eq!(seen.stats().estimated_wait_minutes, 5);

    assert_eq!(operator.complete_service(WindowId::new(2)), Ok(true));
    let seen = until(&mut rx, |s| s.stats().serving_count == 0).await;
    assert!(seen.now_serving().is_empty());

    assert_eq!(operator.reset_queue(), Ok(()));
    let seen = until(&mut rx, |s| s.next_number == 1).await;
    assert!(seen.queue.is_empty());
}

#[tokio::test]
async fn display_follows_operator_over_storage_events() {
    let profile = Profile::in_memory(config(false, true));
    let display = open(&profile);
    let operator = open(&profile);
    let (_sub, mut rx) = watch(&display);
    let _ = until(&mut rx, |_| true).await;

    assert!(operator.add_customer().is_ok());
    let seen = until(&mut rx, |s| s.queue.len() == 1).await;
    assert_eq!(
        seen.queue.first().map(|t| t.queue_number.as_str()),
        Some("A001")
    );
}

#[tokio::test]
async fn file_profile_signals_between_handles() {
    let Ok(dir) = tempfile::tempdir() else {
        panic!("tempdir failed");
    };
    let config = QueueConfig {
        storage_backend: StorageBackend::File,
        storage_dir: dir.path().to_path_buf(),
        storage_poll_interval: Duration::from_millis(20),
        ..config(false, true)
    };
    let Ok(profile) = Profile::from_config(config) else {
        panic!("file profile failed");
    };
    let display = open(&profile);
    let operator = open(&profile);
    let (_sub, mut rx) = watch(&display);
    let _ = until(&mut rx, |_| true).await;

    assert!(operator.add_customer().is_ok());
    assert!(operator.add_customer().is_ok());
    let seen = until(&mut rx, |s| s.queue.len() == 2).await;
    assert_eq!(seen.next_number, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_context_is_not_told_about_its_own_writes() {
    let Ok(dir) = tempfile::tempdir() else {
        panic!("tempdir failed");
    };
    let config = QueueConfig {
        storage_backend: StorageBackend::File,
        storage_dir: dir.path().to_path_buf(),
        storage_poll_interval: Duration::from_millis(1),
        ..config(false, true)
    };
    let Ok(profile) = Profile::from_config(config) else {
        panic!("file profile failed");
    };
    let store = Arc::new(open(&profile));

    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deliveries);
    let _sub = store.subscribe(move |_: &QueueSnapshot| -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    const ADDS: usize = 500;
    let writer = Arc::clone(&store);
    let added = tokio::task::spawn_blocking(move || {
        (0..ADDS).all(|_| writer.add_customer().is_ok())
    })
    .await;
    assert!(matches!(added, Ok(true)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(deliveries.load(Ordering::SeqCst), ADDS + 1);
}

#[tokio::test]
async fn small_channel_does_not_shrink_storage_event_ring() {
    let profile = Profile::in_memory(QueueConfig {
        channel_capacity: 1,
        ..config(false, true)
    });
    let display = open(&profile);
    let operator = open(&profile);
    let (_sub, mut rx) = watch(&display);
    let _ = until(&mut rx, |_| true).await;

    for _ in 0..5 {
        assert!(operator.add_customer().is_ok());
    }

    let mut lengths = BTreeSet::new();
    let _ = until(&mut rx, |s| {
        lengths.insert(s.queue.len());
        s.queue.len() == 5
    })
    .await;
    assert_eq!(lengths, (1..=5).collect::<BTreeSet<_>>());
}

#[tokio::test]
async fn local_only_context_still_notifies_itself() {
    let profile = Profile::in_memory(config(false, false));
    let display = open(&profile);
    let operator = open(&profile);

    let (_remote, mut remote_rx) = watch(&display);
    let (_local, mut local_rx) = watch(&operator);
    let _ = until(&mut remote_rx, |_| true).await;
    let _ = until(&mut local_rx, |_| true).await;

    assert!(operator.add_customer().is_ok());
    let seen = until(&mut local_rx, |s| s.queue.len() == 1).await;
    assert_eq!(seen.next_number, 2);

    let silent = tokio::time::timeout(Duration::from_millis(100), remote_rx.recv()).await;
    assert!(silent.is_err());

    let Ok(Some(stored)) = display.snapshot() else {
        panic!("shared record missing");
    };
    assert_eq!(stored.queue.len(), 1);
}

#[tokio::test]
async fn observer_defers_mutation_with_spawn() {
    let profile = Profile::in_memory(config(true, false));
    let store = Arc::new(open(&profile));
    let weak = Arc::downgrade(&store);
    let rejected: Arc<Mutex<Vec<QueueError>>> = Arc::default();
    let rejected_in = Arc::clone(&rejected);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _sub = store.subscribe(move |s: &QueueSnapshot| -> anyhow::Result<()> {
        if s.next_number == 2
            && let Some(store) = weak.upgrade()
        {
            if let Err(e) = store.add_customer() {
                rejected_in
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(e);
            }
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(store.add_customer());
            });
        }
        Ok(())
    });

    assert!(store.add_customer().is_ok());
    let deferred = tokio::time::timeout(WAIT, rx.recv()).await;
    let Ok(Some(Ok(ticket))) = deferred else {
        panic!("deferred mutation did not run");
    };
    assert_eq!(ticket.queue_number, "A002");
    assert_eq!(
        rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_slice(),
        &[QueueError::ReentrantMutation("add_customer")]
    );
}
