//! Bot process supervision.
//!
//! [`Supervisor`] owns the single bot process and its derived connection
//! state. Every mutation happens behind one async mutex, and `reset` holds
//! it for its whole stop, cleanup, restart sequence. After each mutation the
//! resulting [`StatusSnapshot`] is published; `status()` reads live state
//! when the lock is free and the last published snapshot when an operation
//! is in flight, so readers never see a half-applied transition.

pub mod child_monitor;
pub mod cleanup;
pub mod marker;
pub mod process;
pub mod state;
pub mod terminate;

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::status::{DerivedStatus, DisconnectCause, StatusSnapshot};
use crate::AppError;

use self::cleanup::RetryPolicy;
use self::marker::MarkerWait;
use self::process::{describe_exit, ProcessHandle, SpawnSpec};
use self::state::{ConnectionStateMachine, StateEvent};

/// Result payload shared by `start`, `stop`, and `reset`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotResponse {
    /// Human-readable outcome.
    pub message: String,
    /// Whether the bot is connected after the operation.
    pub connected: bool,
    /// Whether the pairing marker is ready (reset only).
    #[serde(rename = "qr_ready", skip_serializing_if = "Option::is_none")]
    pub marker_ready: Option<bool>,
    /// Set when the operation failed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl BotResponse {
    fn ok(message: impl Into<String>, connected: bool) -> Self {
        Self {
            message: message.into(),
            connected,
            marker_ready: None,
            error: false,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            connected: false,
            marker_ready: None,
            error: true,
        }
    }
}

/// Acknowledgement for the bot's connected/disconnected signals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalAck {
    /// Human-readable outcome.
    pub message: String,
    /// Connected flag after the signal.
    pub connected: bool,
    /// Last error after the signal.
    pub error: Option<String>,
}

/// How a `reset` concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// New process running and the pairing marker is on disk.
    MarkerReady,
    /// New process running; the marker did not appear before the deadline.
    StillWaiting,
    /// The new process could not be spawned or died during startup.
    StartFailed(String),
    /// A session directory could not be removed; no process is running.
    CleanupFailed(PathBuf),
}

impl ResetOutcome {
    /// Whether the reset should be reported as a server-side failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StartFailed(_))
    }

    /// User-facing payload for this outcome.
    #[must_use]
    pub fn response(&self) -> BotResponse {
        match self {
            Self::MarkerReady => BotResponse {
                message: "Bot reset successfully. QR code is ready for scanning.".into(),
                connected: false,
                marker_ready: Some(true),
                error: false,
            },
            Self::StillWaiting => BotResponse {
                message: "Bot reset successfully but QR code generation is taking longer than expected. Please wait...".into(),
                connected: false,
                marker_ready: Some(false),
                error: false,
            },
            Self::StartFailed(message) => BotResponse {
                marker_ready: Some(false),
                ..BotResponse::failure(message.clone())
            },
            Self::CleanupFailed(path) => BotResponse {
                marker_ready: Some(false),
                ..BotResponse::failure(cleanup_message(path))
            },
        }
    }
}

fn cleanup_message(path: &std::path::Path) -> String {
    format!(
        "Failed to remove {}. Please close WhatsApp Web and try again.",
        path.display()
    )
}

/// State guarded by the supervisor lock.
#[derive(Debug, Default)]
struct Inner {
    process: Option<ProcessHandle>,
    machine: ConnectionStateMachine,
}

/// Owner of the bot process and its connection state.
#[derive(Debug)]
pub struct Supervisor {
    config: Arc<GlobalConfig>,
    spec: SpawnSpec,
    inner: Mutex<Inner>,
    published: watch::Sender<StatusSnapshot>,
}

impl Supervisor {
    /// Build a supervisor that launches the bot described by `config`.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let spec = SpawnSpec::from_config(&config);
        Self::with_spawn_spec(config, spec)
    }

    /// Build a supervisor with an explicit launch spec.
    #[must_use]
    pub fn with_spawn_spec(config: Arc<GlobalConfig>, spec: SpawnSpec) -> Self {
        let (published, _) = watch::channel(StatusSnapshot::initial());
        Self {
            config,
            spec,
            inner: Mutex::new(Inner::default()),
            published,
        }
    }

    /// Configuration this supervisor was built with.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Start the bot unless it is already running.
    pub async fn start(&self) -> BotResponse {
        async {
            let mut inner = self.inner.lock().await;
            let response = self.start_locked(&mut inner).await;
            self.commit(&mut inner).await;
            response
        }
        .instrument(info_span!("supervisor_start"))
        .await
    }

    /// Stop the bot: graceful request, then a forced kill after the grace
    /// period.
    pub async fn stop(&self) -> BotResponse {
        async {
            let mut inner = self.inner.lock().await;
            let response = self.stop_locked(&mut inner).await;
            self.commit(&mut inner).await;
            response
        }
        .instrument(info_span!("supervisor_stop"))
        .await
    }

    /// Stop, wipe session state, restart, and wait for a fresh pairing
    /// marker. Holds the lock for the entire sequence.
    pub async fn reset(&self) -> ResetOutcome {
        async {
            let mut inner = self.inner.lock().await;
            let outcome = self.reset_locked(&mut inner).await;
            self.commit(&mut inner).await;
            info!(?outcome, "reset finished");
            outcome
        }
        .instrument(info_span!("supervisor_reset"))
        .await
    }

    /// Bot signal: connected. Consumes the pairing marker.
    pub async fn report_connected(&self) -> SignalAck {
        let mut inner = self.inner.lock().await;
        self.remove_marker().await;
        inner.machine.apply(StateEvent::Connected);
        info!("bot reported connected");
        let snapshot = self.commit(&mut inner).await;
        SignalAck {
            message: "Bot connection status updated".into(),
            connected: snapshot.connected,
            error: snapshot.last_error,
        }
    }

    /// Bot signal: disconnected, with an optional raw reason.
    pub async fn report_disconnected(&self, reason: Option<String>) -> SignalAck {
        info!(reason = reason.as_deref().unwrap_or(""), "bot reported disconnected");
        self.disconnect_with(StateEvent::Disconnected { reason }).await
    }

    /// Bot signal: disconnected, with a report that could not be read.
    /// Recorded as a lost connection.
    pub async fn report_connection_lost(&self) -> SignalAck {
        info!("bot reported disconnected without a readable reason");
        self.disconnect_with(StateEvent::Failed {
            error: DisconnectCause::ConnectionLost.message(""),
        })
        .await
    }

    async fn disconnect_with(&self, event: StateEvent) -> SignalAck {
        let mut inner = self.inner.lock().await;
        inner.machine.apply(event);
        let snapshot = self.commit(&mut inner).await;
        SignalAck {
            message: "Bot disconnected status updated".into(),
            connected: false,
            error: snapshot.last_error,
        }
    }

    /// Consistent status snapshot.
    pub async fn status(&self) -> StatusSnapshot {
        match self.inner.try_lock() {
            Ok(mut inner) => self.commit(&mut inner).await,
            Err(_) => self.published.borrow().clone(),
        }
    }

    /// Reap an exited process if no operation is in flight. Returns the exit
    /// status when a dead process was found.
    pub async fn reap_if_idle(&self) -> Option<Option<ExitStatus>> {
        let mut inner = self.inner.try_lock().ok()?;
        let reaped = Self::reap_exited(&mut inner);
        if reaped.is_some() {
            self.commit(&mut inner).await;
        }
        reaped
    }

    async fn start_locked(&self, inner: &mut Inner) -> BotResponse {
        Self::reap_exited(inner);
        if inner.process.is_some() {
            return BotResponse::ok("Bot is already running", inner.machine.is_connected());
        }

        for dir in [&self.config.paths.auth_dir, &self.config.paths.cache_dir] {
            if let Err(err) = tokio::fs::create_dir_all(dir).await {
                let message = format!("Failed to create directory {}: {err}", dir.display());
                error!(%message);
                inner.machine.apply(StateEvent::Failed {
                    error: message.clone(),
                });
                return BotResponse::failure(message);
            }
        }

        if let Err(err) = self.spawn_locked(inner) {
            let message = format!("Error starting bot: {}", err_message(&err));
            return BotResponse::failure(message);
        }

        match self.warm_up(inner).await {
            Ok(()) => BotResponse::ok("Bot started successfully", false),
            Err(err) => BotResponse::failure(err_message(&err)),
        }
    }

    async fn stop_locked(&self, inner: &mut Inner) -> BotResponse {
        let Some(mut handle) = inner.process.take() else {
            inner.machine.apply(StateEvent::Stopped);
            return BotResponse::ok("Bot is not running", false);
        };
        let termination = handle.terminate(self.config.grace_timeout()).await;
        inner.machine.apply(StateEvent::Stopped);
        info!(pid = handle.pid().unwrap_or(0), ?termination, "bot process stopped");
        if termination == process::Termination::AlreadyExited {
            BotResponse::ok("Bot is not running", false)
        } else {
            BotResponse::ok("Bot stopped successfully", false)
        }
    }

    async fn reset_locked(&self, inner: &mut Inner) -> ResetOutcome {
        // Terminate and drop the handle before touching the filesystem.
        self.stop_locked(inner).await;
        tokio::time::sleep(self.config.release_delay()).await;

        let policy = RetryPolicy {
            max_attempts: self.config.cleanup.max_attempts,
            backoff: self.config.cleanup_backoff(),
        };
        let dirs = [
            self.config.paths.auth_dir.clone(),
            self.config.paths.cache_dir.clone(),
        ];
        if let Err(failure) = cleanup::cleanup(&dirs, &policy).await {
            let path = failure.path.clone();
            let err = AppError::from(failure);
            warn!(%err, "reset aborted");
            inner.machine.apply(StateEvent::Failed {
                error: cleanup_message(&path),
            });
            return ResetOutcome::CleanupFailed(path);
        }

        self.remove_marker().await;

        if let Err(err) = self.spawn_locked(inner) {
            let message = format!("Error resetting bot: {}", err_message(&err));
            return ResetOutcome::StartFailed(message);
        }

        let Some(handle) = inner.process.as_mut() else {
            return ResetOutcome::StartFailed("Error resetting bot: process handle missing".into());
        };
        let wait = marker::await_marker(
            &self.config.paths.marker,
            self.config.marker_wait(),
            self.config.marker_poll(),
            handle,
        )
        .await;

        match wait {
            MarkerWait::Present => {
                inner.machine.apply(StateEvent::MarkerAppeared);
                ResetOutcome::MarkerReady
            }
            MarkerWait::TimedOut => ResetOutcome::StillWaiting,
            MarkerWait::ProcessExitedEarly => {
                let err = self.fail_early_exit(inner).await;
                ResetOutcome::StartFailed(err_message(&err))
            }
        }
    }

    fn spawn_locked(&self, inner: &mut Inner) -> crate::Result<()> {
        match ProcessHandle::start(&self.spec) {
            Ok(handle) => {
                inner.process = Some(handle);
                inner.machine.apply(StateEvent::Started);
                Ok(())
            }
            Err(err) => {
                error!(%err, "bot spawn failed");
                inner.machine.apply(StateEvent::Failed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Fail fast if the process dies inside the warm-up window.
    async fn warm_up(&self, inner: &mut Inner) -> crate::Result<()> {
        let deadline = tokio::time::Instant::now() + self.config.warmup();
        loop {
            let alive = inner.process.as_mut().is_some_and(ProcessHandle::is_alive);
            if !alive {
                return Err(self.fail_early_exit(inner).await);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep(self.config.marker_poll().min(deadline - now)).await;
        }
    }

    /// Drop an exited process, capture its stderr, and record the failure.
    async fn fail_early_exit(&self, inner: &mut Inner) -> AppError {
        let (status, stderr) = match inner.process.take() {
            Some(mut handle) => {
                let (_, stderr) = handle.collect_output().await;
                (handle.exit_status(), stderr)
            }
            None => (None, String::new()),
        };
        let message = format!("Bot failed to start. Error: {stderr}");
        error!(status = %describe_exit(status), %message);
        inner.machine.apply(StateEvent::Exited {
            error: Some(message.clone()),
        });
        AppError::ProcessExitedEarly(message)
    }

    /// Null out a handle whose process is gone and force `Disconnected`.
    fn reap_exited(inner: &mut Inner) -> Option<Option<ExitStatus>> {
        let alive = inner.process.as_mut()?.is_alive();
        if alive {
            return None;
        }
        let handle = inner.process.take()?;
        let status = handle.exit_status();
        let description = describe_exit(status);
        let uptime_secs = (chrono::Utc::now() - handle.started_at()).num_seconds();
        warn!(
            pid = handle.pid().unwrap_or(0),
            status = %description,
            uptime_secs,
            "bot process exited"
        );
        inner.machine.apply(StateEvent::Exited {
            error: Some(format!("Bot process exited unexpectedly ({description})")),
        });
        Some(status)
    }

    async fn remove_marker(&self) {
        let marker = &self.config.paths.marker;
        match tokio::fs::remove_file(marker).await {
            Ok(()) => info!(marker = %marker.display(), "pairing marker removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => error!(marker = %marker.display(), %err, "error removing pairing marker"),
        }
    }

    /// Reconcile with the process and filesystem, then publish the result.
    async fn commit(&self, inner: &mut Inner) -> StatusSnapshot {
        Self::reap_exited(inner);
        let process_alive = inner.process.is_some();
        if !process_alive && inner.machine.is_connected() {
            inner.machine.apply(StateEvent::Stopped);
        }
        let marker_exists = marker::marker_exists(&self.config.paths.marker).await;
        if marker_exists {
            inner.machine.apply(StateEvent::MarkerAppeared);
        }
        let connected = inner.machine.is_connected();
        let snapshot = StatusSnapshot {
            connected,
            process_alive,
            marker_exists,
            last_error: inner.machine.last_error().map(str::to_owned),
            derived_status: DerivedStatus::derive(connected, process_alive, marker_exists),
            state: inner.machine.state(),
            pid: inner.process.as_ref().and_then(ProcessHandle::pid),
            timestamp: chrono::Utc::now().timestamp(),
        };
        self.published.send_replace(snapshot.clone());
        snapshot
    }
}

fn err_message(err: &AppError) -> String {
    match err {
        AppError::ProcessExitedEarly(message) | AppError::Spawn(message) => message.clone(),
        other => other.to_string(),
    }
}
