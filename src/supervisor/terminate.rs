//! Platform-specific process-tree termination.
//!
//! The bot is spawned as the leader of its own process group (POSIX) or in
//! a new process group (Windows), so both requests below reach the browser
//! helpers it launches as well as the bot itself.

#[cfg(unix)]
mod imp {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    use crate::{AppError, Result};

    fn to_pid(pid: u32) -> Result<Pid> {
        i32::try_from(pid)
            .map(Pid::from_raw)
            .map_err(|_| AppError::Io(format!("pid {pid} out of range")))
    }

    fn signal_tree(pid: u32, signal: Signal) -> Result<()> {
        let pid = to_pid(pid)?;
        let result = match killpg(pid, signal) {
            // Not a group leader; signal the single process instead.
            Err(Errno::ESRCH) => kill(pid, signal),
            other => other,
        };
        match result {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(AppError::Io(format!(
                "failed to send {signal} to {pid}: {err}"
            ))),
        }
    }

    /// Ask the process tree to exit (`SIGTERM`).
    #[allow(clippy::unused_async)] // signature shared with the Windows variant
    pub async fn request_graceful(pid: u32) -> Result<()> {
        signal_tree(pid, Signal::SIGTERM)
    }

    /// Kill the process tree outright (`SIGKILL`).
    #[allow(clippy::unused_async)]
    pub async fn force_kill(pid: u32) -> Result<()> {
        signal_tree(pid, Signal::SIGKILL)
    }
}

#[cfg(windows)]
mod imp {
    use std::process::Stdio;

    use tokio::process::Command;

    use crate::{AppError, Result};

    async fn taskkill(pid: u32, force: bool) -> Result<()> {
        let mut cmd = Command::new("taskkill");
        if force {
            cmd.arg("/F");
        }
        cmd.args(["/T", "/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = cmd
            .status()
            .await
            .map_err(|err| AppError::Io(format!("failed to run taskkill: {err}")))?;
        // 128: process not found, i.e. already gone.
        if status.success() || status.code() == Some(128) {
            Ok(())
        } else {
            Err(AppError::Io(format!("taskkill exited with {status}")))
        }
    }

    /// Ask the job tree to close (`taskkill /T`).
    pub async fn request_graceful(pid: u32) -> Result<()> {
        taskkill(pid, false).await
    }

    /// Kill the job tree outright (`taskkill /F /T`).
    pub async fn force_kill(pid: u32) -> Result<()> {
        taskkill(pid, true).await
    }
}

pub use imp::{force_kill, request_graceful};
