//! Wire contract for the status payload served by `/bot_status` and the
//! IPC `status` command. Dashboard scripts key on these exact names.

use bot_supervisor::models::status::{ConnectionState, DerivedStatus, StatusSnapshot};
use serde_json::{json, Value};

fn snapshot() -> StatusSnapshot {
    StatusSnapshot {
        connected: false,
        process_alive: true,
        marker_exists: true,
        last_error: None,
        derived_status: DerivedStatus::Connecting,
        state: ConnectionState::AwaitingScan,
        pid: Some(4242),
        timestamp: 1_700_000_000,
    }
}

#[test]
fn status_payload_field_names() {
    let value = serde_json::to_value(snapshot()).unwrap();
    assert_eq!(
        value,
        json!({
            "connected": false,
            "process_running": true,
            "qr_code_exists": true,
            "error": null,
            "status": "connecting",
            "state": "awaiting_scan",
            "pid": 4242,
            "timestamp": 1_700_000_000,
        })
    );
}

#[test]
fn pid_is_omitted_without_a_process() {
    let value = serde_json::to_value(StatusSnapshot::initial()).unwrap();
    let object = value.as_object().unwrap();
    assert!(!object.contains_key("pid"));
    assert_eq!(object["status"], "disconnected");
    assert_eq!(object["error"], Value::Null);
}

#[test]
fn derived_status_names() {
    for (status, name) in [
        (DerivedStatus::Connecting, "connecting"),
        (DerivedStatus::Connected, "connected"),
        (DerivedStatus::Disconnected, "disconnected"),
        (DerivedStatus::Starting, "starting"),
    ] {
        assert_eq!(serde_json::to_value(status).unwrap(), json!(name));
    }
}

#[test]
fn error_string_is_passed_through() {
    let mut snap = snapshot();
    snap.last_error = Some("Bot process exited unexpectedly (exited with code 1)".into());
    let value = serde_json::to_value(snap).unwrap();
    assert_eq!(
        value["error"],
        "Bot process exited unexpectedly (exited with code 1)"
    );
}
