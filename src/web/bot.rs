//! Bot control, status, and callback handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info_span, warn, Instrument};

use super::AppState;
use crate::supervisor::marker::marker_exists;
use crate::supervisor::SignalAck;

/// `GET /start_bot`.
pub async fn start_bot(State(state): State<Arc<AppState>>) -> Response {
    let response = state.supervisor.start().await;
    let status = if response.error {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(response)).into_response()
}

/// `GET /stop_bot`.
pub async fn stop_bot(State(state): State<Arc<AppState>>) -> Response {
    Json(state.supervisor.stop().await).into_response()
}

/// `GET /reset_bot`.
pub async fn reset_bot(State(state): State<Arc<AppState>>) -> Response {
    let outcome = state.supervisor.reset().await;
    let status = if outcome.is_failure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(outcome.response())).into_response()
}

/// `GET /bot_status`.
pub async fn bot_status(State(state): State<Arc<AppState>>) -> Response {
    Json(state.supervisor.status().await).into_response()
}

/// `GET /is_bot_ready`.
pub async fn is_bot_ready(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.supervisor.status().await;
    Json(json!({
        "ready": snapshot.connected && snapshot.process_alive,
        "connected": snapshot.connected,
        "process_running": snapshot.process_alive,
    }))
    .into_response()
}

/// `GET /qr_code_exists`.
pub async fn qr_code_exists(State(state): State<Arc<AppState>>) -> Response {
    let marker = &state.config.paths.marker;
    let exists = marker_exists(marker).await;
    Json(json!({
        "exists": exists,
        "path": exists.then(|| marker.display().to_string()),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
    .into_response()
}

/// `GET /get_qr_code`: the marker image, or a JSON notice when absent.
pub async fn get_qr_code(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(&state.config.paths.marker).await {
        Ok(bytes) => ([(CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(%err, "failed to read pairing marker");
            }
            Json(json!({ "message": "QR code not available" })).into_response()
        }
    }
}

/// `POST /set_bot_connected`.
pub async fn set_bot_connected(State(state): State<Arc<AppState>>) -> Json<SignalAck> {
    Json(
        state
            .supervisor
            .report_connected()
            .instrument(info_span!("bot_callback", signal = "connected"))
            .await,
    )
}

#[derive(Debug, Default, Deserialize)]
struct DisconnectBody {
    error: Option<String>,
}

/// `POST /set_bot_disconnected` with an optional `{"error": reason}` body.
///
/// An unreadable body is recorded as a lost connection.
pub async fn set_bot_disconnected(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<SignalAck> {
    let span = info_span!("bot_callback", signal = "disconnected");
    let supervisor = &state.supervisor;
    let ack = if body.iter().all(u8::is_ascii_whitespace) {
        supervisor.report_disconnected(None).instrument(span).await
    } else {
        match serde_json::from_slice::<DisconnectBody>(&body) {
            Ok(parsed) => supervisor.report_disconnected(parsed.error).instrument(span).await,
            Err(err) => {
                warn!(%err, "unparsable disconnect body");
                supervisor.report_connection_lost().instrument(span).await
            }
        }
    };
    Json(ack)
}
