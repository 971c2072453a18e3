//! Pairing-marker watcher.
//!
//! Polls for the marker file on a fixed interval. Liveness of the owning
//! process is re-checked on every tick, so a crash during the wait ends it
//! immediately.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::process::ProcessHandle;

/// Outcome of waiting for the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerWait {
    /// Marker exists.
    Present,
    /// Deadline elapsed with the process still running.
    TimedOut,
    /// The owning process exited before the marker appeared.
    ProcessExitedEarly,
}

/// Anything whose liveness can be checked without blocking.
pub trait LivenessProbe {
    /// Whether the watched process is still running.
    fn is_alive(&mut self) -> bool;
}

impl LivenessProbe for ProcessHandle {
    fn is_alive(&mut self) -> bool {
        ProcessHandle::is_alive(self)
    }
}

/// Whether `path` currently exists; unreadable metadata counts as absent.
pub async fn marker_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Wait for `path` to appear, polling every `poll_interval` for at most
/// `timeout`.
pub async fn await_marker<P>(
    path: &Path,
    timeout: Duration,
    poll_interval: Duration,
    probe: &mut P,
) -> MarkerWait
where
    P: LivenessProbe + ?Sized,
{
    let deadline = Instant::now() + timeout;
    loop {
        if !probe.is_alive() {
            debug!(marker = %path.display(), "process exited while waiting for marker");
            return MarkerWait::ProcessExitedEarly;
        }
        if marker_exists(path).await {
            return MarkerWait::Present;
        }

        let now = Instant::now();
        if now >= deadline {
            return MarkerWait::TimedOut;
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}
