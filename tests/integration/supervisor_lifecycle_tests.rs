//! Integration tests for supervisor start/stop, bot signals, and the
//! end-to-end pairing scenario.

#![cfg(unix)]

use std::time::Duration;

use bot_supervisor::models::status::{ConnectionState, DerivedStatus};

use super::test_helpers::{supervisor, wait_for_status, PAIRING_BOT, SILENT_BOT};

#[tokio::test]
async fn stop_on_idle_supervisor_is_a_no_op() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);

    let response = sup.stop().await;
    assert_eq!(response.message, "Bot is not running");
    assert!(!response.connected);
    assert!(!response.error);
}

#[tokio::test]
async fn start_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);

    let first = sup.start().await;
    assert_eq!(first.message, "Bot started successfully");
    assert!(!first.error);
    let pid = sup.status().await.pid;
    assert!(pid.is_some());

    let second = sup.start().await;
    assert_eq!(second.message, "Bot is already running");
    assert_eq!(sup.status().await.pid, pid, "no second process");

    let stopped = sup.stop().await;
    assert_eq!(stopped.message, "Bot stopped successfully");
    let status = sup.status().await;
    assert!(!status.process_alive);
    assert_eq!(status.derived_status, DerivedStatus::Disconnected);
}

#[tokio::test]
async fn start_creates_session_directories() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);

    sup.start().await;
    assert!(sup.config().paths.auth_dir.is_dir());
    assert!(sup.config().paths.cache_dir.is_dir());
    sup.stop().await;
}

#[tokio::test]
async fn early_exit_during_warmup_reports_stderr() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), "echo 'invalid session' >&2; exit 1");

    let response = sup.start().await;
    assert!(response.error);
    assert!(!response.connected);
    assert_eq!(response.message, "Bot failed to start. Error: invalid session");

    let status = sup.status().await;
    assert!(!status.process_alive);
    assert_eq!(status.derived_status, DerivedStatus::Disconnected);
    assert_eq!(
        status.last_error.as_deref(),
        Some("Bot failed to start. Error: invalid session")
    );
}

#[tokio::test]
async fn missing_executable_is_reported_not_raised() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = super::test_helpers::test_config(temp.path(), SILENT_BOT);
    config.bot.command = "definitely-not-a-real-bot-binary".into();
    let sup = bot_supervisor::supervisor::Supervisor::new(std::sync::Arc::new(config));

    let response = sup.start().await;
    assert!(response.error);
    assert!(
        response
            .message
            .starts_with("Error starting bot: failed to launch 'definitely-not-a-real-bot-binary'"),
        "{}",
        response.message
    );
    assert!(!response.message.contains("spawn:"), "{}", response.message);
    assert!(!sup.status().await.process_alive);
}

#[tokio::test]
async fn report_connected_consumes_marker() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    sup.start().await;
    std::fs::write(&sup.config().paths.marker, b"png").expect("write marker");

    let ack = sup.report_connected().await;
    assert!(ack.connected);
    assert!(ack.error.is_none());
    assert!(!sup.config().paths.marker.exists());

    let status = sup.status().await;
    assert!(status.connected);
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.derived_status, DerivedStatus::Connected);
    sup.stop().await;
}

#[tokio::test]
async fn report_disconnected_classifies_reason() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    sup.start().await;
    sup.report_connected().await;

    let ack = sup
        .report_disconnected(Some("Cannot read properties of null".into()))
        .await;
    assert!(!ack.connected);
    assert_eq!(
        ack.error.as_deref(),
        Some("WhatsApp connection lost. Please reset the bot and scan the QR code again.")
    );

    let ack = sup.report_disconnected(None).await;
    assert!(
        ack.error.is_some_and(|e| e.contains("connection lost")),
        "an absent reason keeps the previous error"
    );
    sup.stop().await;
}

#[tokio::test]
async fn connection_lost_overrides_the_previous_reason() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    sup.start().await;
    sup.report_connected().await;
    sup.report_disconnected(Some("Session closed".into())).await;

    let ack = sup.report_connection_lost().await;
    assert!(!ack.connected);
    assert_eq!(
        ack.error.as_deref(),
        Some("WhatsApp connection lost. Please reset the bot and scan the QR code again.")
    );
    let snapshot = sup.status().await;
    assert!(!snapshot.connected);
    assert_eq!(snapshot.last_error, ack.error);
    sup.stop().await;
}

#[tokio::test]
async fn connected_is_never_reported_without_a_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);

    let ack = sup.report_connected().await;
    assert!(!ack.connected);
    let status = sup.status().await;
    assert!(!status.connected);
    assert_eq!(status.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn end_to_end_pairing_scenario() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), PAIRING_BOT);

    let response = sup.start().await;
    assert_eq!(response.message, "Bot started successfully");
    assert_eq!(sup.status().await.derived_status, DerivedStatus::Starting);

    let status = wait_for_status(&sup, Duration::from_secs(5), |s| s.marker_exists).await;
    assert!(status.marker_exists, "marker should appear");
    assert_eq!(status.derived_status, DerivedStatus::Connecting);
    assert_eq!(status.state, ConnectionState::AwaitingScan);

    sup.report_connected().await;
    let status = sup.status().await;
    assert_eq!(status.derived_status, DerivedStatus::Connected);
    assert!(!status.marker_exists);
    assert!(!sup.config().paths.marker.exists());

    sup.stop().await;
    let status = sup.status().await;
    assert!(!status.connected);
    assert_eq!(status.derived_status, DerivedStatus::Disconnected);
}
