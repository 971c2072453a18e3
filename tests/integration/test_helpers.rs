//! Shared fixtures for integration tests.
//!
//! Bot processes are `/bin/sh -c <script>` running in a temporary instance
//! directory, so every path the supervisor touches is isolated per test.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use bot_supervisor::config::{GlobalConfig, TimeoutConfig};
use bot_supervisor::models::status::StatusSnapshot;
use bot_supervisor::supervisor::Supervisor;
use bot_supervisor::web::{serve_http_with_listener, AppState};

/// Script that writes the pairing marker after a short delay, then idles.
pub const PAIRING_BOT: &str = "sleep 0.3; : > qr_code.png; exec sleep 30";

/// Script that idles without ever producing a marker.
pub const SILENT_BOT: &str = "exec sleep 30";

/// Build a config rooted at `root` running `script` under `sh`, with
/// millisecond-scale timeouts.
pub fn test_config(root: &Path, script: &str) -> GlobalConfig {
    let toml = format!(
        "instance_dir = '{}'\nipc_name = '{}'\n",
        root.display(),
        unique_ipc_name()
    );
    let mut config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    config.auth.password = "secret".into();
    config.bot.command = "sh".into();
    config.bot.args = vec!["-c".into(), script.into()];
    config.timeouts = TimeoutConfig {
        grace_ms: 2_000,
        warmup_ms: 150,
        marker_wait_ms: 5_000,
        marker_poll_ms: 20,
        release_delay_ms: 20,
        monitor_interval_ms: 20,
    };
    config.cleanup.max_attempts = 2;
    config.cleanup.backoff_ms = 10;
    config
}

/// Socket name that will not collide with parallel tests.
pub fn unique_ipc_name() -> String {
    format!("bot-supervisor-test-{}", uuid::Uuid::new_v4().simple())
}

/// Supervisor over `test_config(root, script)`.
pub fn supervisor(root: &Path, script: &str) -> Arc<Supervisor> {
    Arc::new(Supervisor::new(Arc::new(test_config(root, script))))
}

/// Poll `status()` until `predicate` holds or `timeout` elapses.
pub async fn wait_for_status(
    supervisor: &Supervisor,
    timeout: Duration,
    predicate: impl Fn(&StatusSnapshot) -> bool,
) -> StatusSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = supervisor.status().await;
        if predicate(&snapshot) || tokio::time::Instant::now() >= deadline {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Running HTTP server bound to an ephemeral port.
pub struct TestServer {
    /// `http://127.0.0.1:<port>`.
    pub base: String,
    /// Shared state behind the server.
    pub state: Arc<AppState>,
    /// Cancels the server.
    pub ct: CancellationToken,
    /// Keeps the instance directory alive.
    pub _temp: tempfile::TempDir,
}

impl TestServer {
    /// Start a server whose bot runs `script`.
    pub async fn start(script: &str) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = Arc::new(test_config(temp.path(), script));
        let supervisor = Arc::new(Supervisor::new(Arc::clone(&config)));
        let state = Arc::new(AppState::new(config, supervisor));
        let ct = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server_state = Arc::clone(&state);
        let server_ct = ct.clone();
        tokio::spawn(async move {
            let _ = serve_http_with_listener(listener, server_state, server_ct).await;
        });

        Self {
            base: format!("http://{addr}"),
            state,
            ct,
            _temp: temp,
        }
    }

    /// Full URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Log in with the test credential and return the `Cookie` header value.
    pub async fn login(&self, client: &reqwest::Client) -> String {
        let resp = client
            .post(self.url("/login"))
            .json(&serde_json::json!({ "username": "bot", "password": "secret" }))
            .send()
            .await
            .expect("login request");
        assert_eq!(resp.status(), 200);
        let set_cookie = resp
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .expect("ascii cookie");
        set_cookie
            .split(';')
            .next()
            .expect("cookie pair")
            .to_owned()
    }

    /// Stop the bot and the server.
    pub async fn shutdown(self) {
        self.state.supervisor.stop().await;
        self.ct.cancel();
    }
}
