//! IPC server tests over a real local socket.

#![cfg(unix)]

use std::sync::Arc;

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericNamespaced, ToNsName};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use bot_supervisor::ipc::server::spawn_ipc_server;
use bot_supervisor::supervisor::Supervisor;

use super::test_helpers::{supervisor, SILENT_BOT};

/// Send each request on one connection and collect the responses.
async fn exchange(name: &str, requests: &[Value]) -> Vec<Value> {
    let name = name
        .to_ns_name::<GenericNamespaced>()
        .expect("valid socket name");
    let conn = Stream::connect(name).await.expect("connect");
    let (reader, mut writer) = conn.split();
    let mut reader = BufReader::new(reader);

    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        let mut line = serde_json::to_string(request).expect("encode");
        line.push('\n');
        writer.write_all(line.as_bytes()).await.expect("write");

        let mut response = String::new();
        reader.read_line(&mut response).await.expect("read");
        responses.push(serde_json::from_str(response.trim()).expect("json response"));
    }
    responses
}

fn serve(sup: &Arc<Supervisor>, token: Option<&str>) -> CancellationToken {
    let ct = CancellationToken::new();
    spawn_ipc_server(Arc::clone(sup), token.map(str::to_owned), ct.clone())
        .expect("ipc listener");
    ct
}

#[tokio::test]
async fn status_over_ipc() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    let ct = serve(&sup, None);

    let responses = exchange(&sup.config().ipc_name, &[json!({ "command": "status" })]).await;
    assert_eq!(responses[0]["ok"], true);
    assert_eq!(responses[0]["data"]["status"], "disconnected");
    assert_eq!(responses[0]["data"]["process_running"], false);
    ct.cancel();
}

#[tokio::test]
async fn lifecycle_and_signals_over_ipc() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    let ct = serve(&sup, None);

    let responses = exchange(
        &sup.config().ipc_name,
        &[
            json!({ "command": "start" }),
            json!({ "command": "connected" }),
            json!({ "command": "disconnected", "reason": "conflict" }),
            json!({ "command": "stop" }),
        ],
    )
    .await;

    assert_eq!(responses[0]["data"]["message"], "Bot started successfully");
    assert_eq!(responses[1]["data"]["connected"], true);
    assert_eq!(responses[2]["data"]["connected"], false);
    assert!(responses[2]["data"]["error"]
        .as_str()
        .is_some_and(|e| e.contains("another window")));
    assert_eq!(responses[3]["data"]["message"], "Bot stopped successfully");
    assert!(!sup.status().await.process_alive);
    ct.cancel();
}

#[tokio::test]
async fn failed_start_is_not_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), "echo nope >&2; exit 1");
    let ct = serve(&sup, None);

    let responses = exchange(&sup.config().ipc_name, &[json!({ "command": "start" })]).await;
    assert_eq!(responses[0]["ok"], false);
    assert_eq!(responses[0]["error"], "Bot failed to start. Error: nope");
    ct.cancel();
}

#[tokio::test]
async fn token_is_enforced() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    let ct = serve(&sup, Some("s3cret"));

    let responses = exchange(
        &sup.config().ipc_name,
        &[
            json!({ "command": "status" }),
            json!({ "command": "status", "auth_token": "guess" }),
            json!({ "command": "status", "auth_token": "s3cret" }),
        ],
    )
    .await;
    assert_eq!(responses[0]["error"], "unauthorized");
    assert_eq!(responses[1]["error"], "unauthorized");
    assert_eq!(responses[2]["ok"], true);
    ct.cancel();
}

#[tokio::test]
async fn malformed_requests_get_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sup = supervisor(temp.path(), SILENT_BOT);
    let ct = serve(&sup, None);

    let responses = exchange(
        &sup.config().ipc_name,
        &[json!({ "command": "explode" }), json!({ "verb": "status" })],
    )
    .await;
    assert_eq!(responses[0]["ok"], false);
    assert_eq!(responses[0]["error"], "unknown command: explode");
    assert_eq!(responses[1]["ok"], false);
    assert!(responses[1]["error"]
        .as_str()
        .is_some_and(|e| e.starts_with("invalid json")));
    ct.cancel();
}
