//! Wire contract for `start_bot`, `stop_bot`, `reset_bot`, and the bot
//! callback acknowledgements.

use std::path::PathBuf;

use bot_supervisor::supervisor::{BotResponse, ResetOutcome, SignalAck};
use serde_json::json;

#[test]
fn reset_ready_payload() {
    let value = serde_json::to_value(ResetOutcome::MarkerReady.response()).unwrap();
    assert_eq!(
        value,
        json!({
            "message": "Bot reset successfully. QR code is ready for scanning.",
            "connected": false,
            "qr_ready": true,
        })
    );
}

#[test]
fn reset_still_waiting_is_not_an_error() {
    let value = serde_json::to_value(ResetOutcome::StillWaiting.response()).unwrap();
    assert_eq!(value["qr_ready"], false);
    assert!(value.get("error").is_none());
    assert_eq!(
        value["message"],
        "Bot reset successfully but QR code generation is taking longer than expected. Please wait..."
    );
}

#[test]
fn reset_failures_carry_the_error_flag() {
    let failed = ResetOutcome::StartFailed("Bot failed to start. Error: boom".into());
    let value = serde_json::to_value(failed.response()).unwrap();
    assert_eq!(
        value,
        json!({
            "message": "Bot failed to start. Error: boom",
            "connected": false,
            "qr_ready": false,
            "error": true,
        })
    );

    let cleanup = ResetOutcome::CleanupFailed(PathBuf::from("/srv/bot/.wwebjs_auth"));
    let value = serde_json::to_value(cleanup.response()).unwrap();
    assert_eq!(value["error"], true);
    assert_eq!(
        value["message"],
        "Failed to remove /srv/bot/.wwebjs_auth. Please close WhatsApp Web and try again."
    );
}

#[test]
fn only_start_failures_are_server_errors() {
    assert!(ResetOutcome::StartFailed(String::new()).is_failure());
    assert!(!ResetOutcome::CleanupFailed(PathBuf::new()).is_failure());
    assert!(!ResetOutcome::StillWaiting.is_failure());
    assert!(!ResetOutcome::MarkerReady.is_failure());
}

#[test]
fn plain_response_omits_optional_fields() {
    let response: BotResponse =
        serde_json::from_value(json!({ "message": "Bot stopped successfully", "connected": false }))
            .unwrap();
    assert!(!response.error);
    assert_eq!(response.marker_ready, None);
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(
        value,
        json!({ "message": "Bot stopped successfully", "connected": false })
    );
}

#[test]
fn signal_ack_always_has_error_key() {
    let ack = SignalAck {
        message: "Bot connection status updated".into(),
        connected: true,
        error: None,
    };
    assert_eq!(
        serde_json::to_value(ack).unwrap(),
        json!({
            "message": "Bot connection status updated",
            "connected": true,
            "error": null,
        })
    );
}
