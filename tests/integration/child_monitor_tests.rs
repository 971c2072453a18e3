//! Integration tests for the background bot process monitor.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bot_supervisor::models::status::DerivedStatus;
use bot_supervisor::supervisor::child_monitor::spawn_child_monitor;

use super::test_helpers::{supervisor, SILENT_BOT};

#[tokio::test]
async fn monitor_publishes_unexpected_exit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), "sleep 0.4; exit 2");
    let response = sup.start().await;
    assert!(!response.error, "{}", response.message);

    assert!(sup.status().await.process_alive);

    let ct = CancellationToken::new();
    let monitor = spawn_child_monitor(Arc::clone(&sup), Duration::from_millis(20), ct.clone());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(sup.reap_if_idle().await, None, "monitor already reaped the exit");

    let snapshot = sup.status().await;
    assert!(!snapshot.process_alive);
    assert!(!snapshot.connected);
    assert_eq!(snapshot.derived_status, DerivedStatus::Disconnected);
    let error = snapshot.last_error.expect("exit recorded");
    assert!(error.contains("exited unexpectedly"), "{error}");
    assert!(error.contains("code 2"), "{error}");

    ct.cancel();
    tokio::time::timeout(Duration::from_secs(1), monitor)
        .await
        .expect("monitor stops on cancel")
        .expect("monitor task did not panic");
}

#[tokio::test]
async fn monitor_leaves_a_healthy_bot_alone() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    sup.start().await;
    let pid = sup.status().await.pid;

    let ct = CancellationToken::new();
    let monitor = spawn_child_monitor(Arc::clone(&sup), Duration::from_millis(10), ct.clone());
    tokio::time::sleep(Duration::from_millis(150)).await;

    let status = sup.status().await;
    assert!(status.process_alive);
    assert_eq!(status.pid, pid);
    assert!(status.last_error.is_none());

    ct.cancel();
    monitor.await.expect("join");
    sup.stop().await;
}

#[tokio::test]
async fn monitor_exits_immediately_when_cancelled() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    let ct = CancellationToken::new();
    ct.cancel();

    let monitor = spawn_child_monitor(sup, Duration::from_secs(60), ct);
    tokio::time::timeout(Duration::from_secs(1), monitor)
        .await
        .expect("cancelled monitor returns promptly")
        .expect("join");
}
