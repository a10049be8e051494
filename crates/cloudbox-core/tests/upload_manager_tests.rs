//! Tests for the upload queue driver.
//!
//! These run the real event loop against a transport whose transfers the
//! test finishes by hand.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cloudbox_core::upload::{
    CancelOutcome, QueueLimits, UploadEvent, UploadManager, UploadSource, UploadStatus,
};
use cloudbox_core::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{CountingRefresh, GatedTransport, PendingTransfer};

const WAIT: Duration = Duration::from_secs(5);

fn limits() -> QueueLimits {
    QueueLimits {
        max_file_size: 1024,
        max_concurrent: 3,
        completion_display_delay: Duration::from_millis(2000),
    }
}

fn file(name: &str) -> UploadSource {
    UploadSource::from_bytes(name, vec![7u8; 16])
}

async fn next_started(rx: &mut mpsc::UnboundedReceiver<PendingTransfer>) -> PendingTransfer {
    timeout(WAIT, rx.recv())
        .await
        .expect("transfer did not start")
        .expect("transport dropped")
}

fn spawn(limits: QueueLimits) -> (
    UploadManager,
    mpsc::UnboundedReceiver<PendingTransfer>,
    Arc<CountingRefresh>,
) {
    let (transport, started) = GatedTransport::new();
    let hooks = Arc::new(CountingRefresh::default());
    let manager = UploadManager::spawn(transport, hooks.clone(), limits);
    (manager, started, hooks)
}

/// At most three transfers run at once and the rest start in FIFO order.
#[tokio::test]
async fn test_concurrency_cap_and_fifo() {
    let (manager, mut started, _) = spawn(limits());

    for i in 0..5 {
        manager.enqueue(file(&format!("f{i}.bin")), None).await.unwrap();
    }

    let first = next_started(&mut started).await;
    let second = next_started(&mut started).await;
    let third = next_started(&mut started).await;
    assert_eq!(
        [first.name.as_str(), second.name.as_str(), third.name.as_str()],
        ["f0.bin", "f1.bin", "f2.bin"]
    );
    assert!(started.try_recv().is_err());

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.uploading, 3);
    assert_eq!(snapshot.pending, 2);

    second.succeed();
    let fourth = next_started(&mut started).await;
    assert_eq!(fourth.name, "f3.bin");
    assert!(started.try_recv().is_err());

    first.succeed();
    let fifth = next_started(&mut started).await;
    assert_eq!(fifth.name, "f4.bin");

    third.succeed();
    fourth.succeed();
    fifth.succeed();
    timeout(WAIT, manager.wait_idle()).await.unwrap();
    assert_eq!(manager.snapshot().count(UploadStatus::Success), 5);
}

/// A rejected file leaves the queue untouched.
#[tokio::test]
async fn test_oversize_file_is_rejected() {
    let (manager, mut started, _) = spawn(limits());

    let big = UploadSource::from_bytes("big.iso", vec![0u8; 1025]);
    let err = manager.enqueue(big, None).await.unwrap_err();
    assert!(matches!(err, Error::SizeExceeded { .. }));
    assert!(manager.snapshot().tasks.is_empty());

    let exact = UploadSource::from_bytes("exact.iso", vec![0u8; 1024]);
    manager.enqueue(exact, None).await.unwrap();
    assert_eq!(next_started(&mut started).await.name, "exact.iso");
}

/// `enqueue_many` keeps going past rejected files.
#[tokio::test]
async fn test_enqueue_many_reports_rejections() {
    let (manager, _started, _) = spawn(limits());

    let report = manager
        .enqueue_many(
            [
                file("a.txt"),
                UploadSource::from_bytes("huge.bin", vec![0u8; 4096]),
                file("b.txt"),
            ],
            None,
        )
        .await;

    assert_eq!(report.queued.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, "huge.bin");
}

/// Cancelling an in-flight upload removes it at once, reports it as
/// cancelled rather than failed, and frees its slot only after the
/// transfer has stopped.
#[tokio::test]
async fn test_cancel_in_flight_is_not_an_error() {
    let (manager, mut started, hooks) = spawn(limits());
    let mut events = manager.events();

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(manager.enqueue(file(&format!("f{i}.bin")), None).await.unwrap());
    }
    let _a = next_started(&mut started).await;
    let _b = next_started(&mut started).await;
    let _c = next_started(&mut started).await;

    let outcome = manager.cancel(ids[0]).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Aborting);
    assert!(manager.snapshot().get(ids[0]).is_none());

    // The aborted transfer returns and the waiting task takes its slot.
    let fourth = next_started(&mut started).await;
    assert_eq!(fourth.name, "f3.bin");

    let mut saw_cancelled = false;
    while let Ok(event) = events.try_recv() {
        match event {
            UploadEvent::Cancelled { id } if id == ids[0] => saw_cancelled = true,
            UploadEvent::Failed { id, .. } => panic!("task {id} reported as failed"),
            _ => {}
        }
    }
    assert!(saw_cancelled);
    assert_eq!(hooks.counts(), (0, 0));
}

/// Cancelling a waiting task never starts it.
#[tokio::test]
async fn test_cancel_pending() {
    let (manager, mut started, _) = spawn(QueueLimits {
        max_concurrent: 1,
        ..limits()
    });

    let first = manager.enqueue(file("first.txt"), None).await.unwrap();
    let second = manager.enqueue(file("second.txt"), None).await.unwrap();
    let transfer = next_started(&mut started).await;

    assert_eq!(manager.cancel(second).await.unwrap(), CancelOutcome::Removed);
    transfer.succeed();
    timeout(WAIT, manager.wait_idle()).await.unwrap();

    assert!(started.try_recv().is_err());
    let snapshot = manager.snapshot();
    assert!(snapshot.get(second).is_none());
    assert_eq!(snapshot.get(first).unwrap().status, UploadStatus::Success);
}

/// Each success asks for one listing and one quota refresh; failures ask
/// for none.
#[tokio::test]
async fn test_refresh_once_per_success() {
    let (manager, mut started, hooks) = spawn(limits());

    manager.enqueue(file("ok.txt"), None).await.unwrap();
    let failing = manager.enqueue(file("bad.txt"), None).await.unwrap();

    let ok = next_started(&mut started).await;
    let bad = next_started(&mut started).await;
    ok.succeed();
    bad.fail("disk full");
    timeout(WAIT, manager.wait_idle()).await.unwrap();

    assert_eq!(hooks.counts(), (1, 1));

    let failed = manager.snapshot().get(failing).cloned().unwrap();
    assert_eq!(failed.status, UploadStatus::Error);
    assert_eq!(failed.error.as_deref(), Some("disk full"));

    assert!(manager.dismiss(failing).await.unwrap());
    assert!(manager.snapshot().get(failing).is_none());
}

/// Progress reported by the transport reaches subscribers.
#[tokio::test]
async fn test_progress_is_published() {
    let (manager, mut started, _) = spawn(limits());
    let id = manager.enqueue(file("p.bin"), None).await.unwrap();
    let transfer = next_started(&mut started).await;

    let mut snapshots = manager.subscribe();
    transfer.progress.report(8, Some(16));
    let progressed = timeout(
        WAIT,
        snapshots.wait_for(|s| s.get(id).is_some_and(|t| t.progress >= 50.0)),
    )
    .await
    .unwrap()
    .unwrap()
    .get(id)
    .map(|t| t.progress);
    assert_eq!(progressed, Some(50.0));

    transfer.succeed();
}

/// Finished uploads stay visible for the display delay, then disappear.
#[tokio::test(start_paused = true)]
async fn test_success_is_removed_after_display_delay() {
    let (manager, mut started, _) = spawn(limits());
    let id = manager.enqueue(file("done.txt"), None).await.unwrap();
    next_started(&mut started).await.succeed();

    let mut snapshots = manager.subscribe();
    snapshots
        .wait_for(|s| s.get(id).is_some_and(|t| t.status == UploadStatus::Success))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(manager.snapshot().get(id).is_some());

    snapshots.wait_for(|s| s.get(id).is_none()).await.unwrap();
}

/// Shutdown cancels everything and returns once transfers have stopped.
#[tokio::test]
async fn test_shutdown_drains() {
    let (manager, mut started, _) = spawn(limits());
    for i in 0..4 {
        manager.enqueue(file(&format!("s{i}")), None).await.unwrap();
    }
    let mut running = Vec::new();
    for _ in 0..3 {
        running.push(next_started(&mut started).await);
    }

    timeout(WAIT, manager.shutdown()).await.unwrap().unwrap();
    let snapshot = manager.snapshot();
    assert!(snapshot.is_idle());
    assert!(snapshot.tasks.is_empty());
}

/// A transfer that aborts on its own is reported as cancelled and removed.
#[tokio::test]
async fn test_unrequested_abort_reports_cancelled() {
    let (manager, mut started, _) = spawn(limits());
    let mut events = manager.events();

    let id = manager.enqueue(file("gone.txt"), None).await.unwrap();
    drop(next_started(&mut started).await);
    timeout(WAIT, manager.wait_idle()).await.unwrap();

    let mut cancelled = false;
    while let Ok(event) = events.try_recv() {
        if event == (UploadEvent::Cancelled { id }) {
            cancelled = true;
        }
    }
    assert!(cancelled);
    assert!(manager.snapshot().get(id).is_none());
}
