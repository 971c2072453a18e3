//! Bot process handle.
//!
//! Spawns the bot with piped stdout/stderr. Two background tasks drain the
//! pipes line by line into the log and keep a bounded tail of recent lines,
//! which is what [`ProcessHandle::collect_output`] returns after an abnormal
//! exit. The child is spawned with `kill_on_drop(true)` so a dropped handle
//! never leaks a running process.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::terminate;
use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Lines retained per stream for error reporting.
const OUTPUT_TAIL_LINES: usize = 200;

/// Upper bound on waiting for the drainers to hit EOF after exit.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to launch the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Executable name or path.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// Variables layered over the inherited environment, last write wins.
    pub env: BTreeMap<String, String>,
}

impl SpawnSpec {
    /// Build the launch description from configuration: base flags from `[bot.env]` plus
    /// the supervisor's own coordinates so the bot can report back.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        let mut env = config.bot.env.clone();
        env.insert(
            "BOT_SUPERVISOR_URL".into(),
            format!("http://127.0.0.1:{}", config.server.port),
        );
        env.insert("BOT_SUPERVISOR_IPC_NAME".into(), config.ipc_name.clone());
        if cfg!(windows) {
            env.insert("PUPPETEER_SKIP_CHROMIUM_DOWNLOAD".into(), "true".into());
        }
        Self {
            command: config.bot.command.clone(),
            args: config.bot.args.clone(),
            working_dir: config.instance_dir.clone(),
            env,
        }
    }

    /// Merge caller-supplied overrides on top of the base environment.
    #[must_use]
    pub fn with_env_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Bounded ring of recent output lines.
#[derive(Debug, Default)]
struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: String) {
        if self.lines.len() == OUTPUT_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

type SharedTail = Arc<Mutex<OutputTail>>;

/// How a termination request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Process had already exited; nothing was sent.
    AlreadyExited,
    /// Process exited within the grace window.
    Graceful,
    /// Grace window elapsed; process was force-killed.
    Forced,
}

/// Exclusive owner of one bot child process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    exit_status: Option<ExitStatus>,
    stdout_tail: SharedTail,
    stderr_tail: SharedTail,
    drainers: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Spawn the bot and start draining its output.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the executable cannot be found or
    /// launched.
    pub fn start(spec: &SpawnSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!("failed to launch '{}': {err}", spec.command))
        })?;

        let pid = child.id();
        let stdout_tail = SharedTail::default();
        let stderr_tail = SharedTail::default();
        let mut drainers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drainers.push(spawn_drainer(stdout, "stdout", Arc::clone(&stdout_tail)));
        }
        if let Some(stderr) = child.stderr.take() {
            drainers.push(spawn_drainer(stderr, "stderr", Arc::clone(&stderr_tail)));
        }

        info!(
            pid = pid.unwrap_or(0),
            command = %spec.command,
            working_dir = %spec.working_dir.display(),
            "bot process spawned"
        );

        Ok(Self {
            child,
            pid,
            started_at: Utc::now(),
            exit_status: None,
            stdout_tail,
            stderr_tail,
            drainers,
        })
    }

    /// OS process id, if the process was running when spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the process was spawned.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Exit status once the process has been observed to exit.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Non-blocking liveness check. The exit status is cached so repeated
    /// calls after exit keep answering `false`.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!(pid = self.pid.unwrap_or(0), %err, "failed to poll bot process status");
                false
            }
        }
    }

    /// Request a graceful exit, wait up to `grace`, then force-kill.
    ///
    /// Calling this on an exited process is a no-op.
    pub async fn terminate(&mut self, grace: Duration) -> Termination {
        if !self.is_alive() {
            return Termination::AlreadyExited;
        }
        let Some(pid) = self.pid else {
            self.force_kill(grace).await;
            return Termination::Forced;
        };

        if let Err(err) = terminate::request_graceful(pid).await {
            warn!(pid, %err, "graceful termination request failed");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid, %status, "bot process exited gracefully");
                self.exit_status = Some(status);
                Termination::Graceful
            }
            Ok(Err(err)) => {
                warn!(pid, %err, "error waiting for bot process; forcing kill");
                self.force_kill(grace).await;
                Termination::Forced
            }
            Err(_) => {
                warn!(pid, ?grace, "bot process did not exit within grace period, forcing kill");
                self.force_kill(grace).await;
                Termination::Forced
            }
        }
    }

    async fn force_kill(&mut self, bound: Duration) {
        let pid = self.pid.unwrap_or(0);
        if let Some(tree) = self.pid {
            if let Err(err) = terminate::force_kill(tree).await {
                warn!(pid, %err, "process tree kill failed");
            }
        }
        if let Err(err) = self.child.start_kill() {
            warn!(pid, %err, "failed to force-kill bot process");
        }
        match tokio::time::timeout(bound, self.child.wait()).await {
            Ok(Ok(status)) => self.exit_status = Some(status),
            Ok(Err(err)) => warn!(pid, %err, "failed to reap killed bot process"),
            Err(_) => warn!(pid, "killed bot process was not reaped in time"),
        }
    }

    /// Drain buffered output as `(stdout, stderr)`.
    ///
    /// Waits briefly for the drain tasks to reach EOF so the tail contains
    /// the last lines written before exit.
    pub async fn collect_output(&mut self) -> (String, String) {
        for drainer in self.drainers.drain(..) {
            let abort = drainer.abort_handle();
            if tokio::time::timeout(DRAIN_TIMEOUT, drainer).await.is_err() {
                abort.abort();
            }
        }
        let read = |tail: &SharedTail| {
            tail.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .joined()
        };
        (read(&self.stdout_tail), read(&self.stderr_tail))
    }
}

/// Forward every line from `reader` to the log and the shared tail until EOF.
fn spawn_drainer<R>(reader: R, stream: &'static str, tail: SharedTail) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!(target: "bot_output", stream, "{}", line.trim_end());
                    tail.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(line);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(stream, %err, "bot output stream read failed");
                    break;
                }
            }
        }
    })
}

/// Human-readable exit status.
#[must_use]
pub fn describe_exit(status: Option<ExitStatus>) -> String {
    status.map_or_else(
        || "status unknown".to_owned(),
        |s| {
            if s.success() {
                "exited normally (code 0)".to_owned()
            } else {
                s.code().map_or_else(
                    || "terminated by signal".to_owned(),
                    |c| format!("exited with code {c}"),
                )
            }
        },
    )
}
