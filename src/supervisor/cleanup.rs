//! Session-state directory removal with bounded retries.
//!
//! The bot (and the browser it drives) can keep file handles open for a
//! short while after termination, and on Windows those handles block
//! deletion. Removal is retried with an escalating backoff whose total per
//! path is bounded by `max_attempts * backoff`; after the last attempt the
//! failing path is returned to the caller.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::AppError;

/// Retry policy for [`cleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per path, at least one.
    pub max_attempts: u32,
    /// Wait after the first failure. Later waits grow by `backoff` each,
    /// capped so one path never sleeps longer than `max_attempts * backoff`.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Total sleep allowed for one path.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.backoff.saturating_mul(self.max_attempts.max(1))
    }

    /// Waits between consecutive attempts on one path, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let budget = self.budget();
        (1..self.max_attempts.max(1)).scan(Duration::ZERO, move |slept, attempt| {
            let delay = self
                .backoff
                .saturating_mul(attempt)
                .min(budget.saturating_sub(*slept));
            *slept += delay;
            Some(delay)
        })
    }
}

/// A path that could not be removed.
#[derive(Debug)]
pub struct CleanupFailed {
    /// Path that is still present.
    pub path: PathBuf,
    /// Attempts made.
    pub attempts: u32,
    /// Last removal error.
    pub source: io::Error,
}

impl Display for CleanupFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} after {} attempt(s): {}",
            self.path.display(),
            self.attempts,
            self.source
        )
    }
}

impl std::error::Error for CleanupFailed {}

impl From<CleanupFailed> for AppError {
    fn from(err: CleanupFailed) -> Self {
        Self::CleanupFailed(err.to_string())
    }
}

/// Remove every path in `paths`, retrying transient lock errors.
///
/// Missing paths count as removed. Stops at the first path that still
/// fails after `policy.max_attempts`.
///
/// # Errors
///
/// Returns [`CleanupFailed`] naming the path that could not be removed.
pub async fn cleanup(paths: &[PathBuf], policy: &RetryPolicy) -> Result<(), CleanupFailed> {
    cleanup_with(paths, policy, remove_session_path).await
}

/// [`cleanup`] with a caller-supplied removal step.
///
/// # Errors
///
/// Returns [`CleanupFailed`] naming the path that could not be removed.
pub async fn cleanup_with<R, Fut>(
    paths: &[PathBuf],
    policy: &RetryPolicy,
    mut remove: R,
) -> Result<(), CleanupFailed>
where
    R: FnMut(PathBuf) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    for path in paths {
        remove_with_retry(path, policy, &mut remove).await?;
    }
    Ok(())
}

async fn remove_with_retry<R, Fut>(
    path: &Path,
    policy: &RetryPolicy,
    remove: &mut R,
) -> Result<(), CleanupFailed>
where
    R: FnMut(PathBuf) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut delays = policy.delays();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match remove(path.to_owned()).await {
            Ok(()) => {
                info!(path = %path.display(), attempt, "session directory removed");
                return Ok(());
            }
            Err(err) => err,
        };
        match delays.next() {
            Some(delay) if is_transient(&err) => {
                warn!(
                    path = %path.display(),
                    attempt,
                    %err,
                    ?delay,
                    "session directory locked, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            _ => {
                warn!(path = %path.display(), attempt, %err, "session directory removal failed");
                return Err(CleanupFailed {
                    path: path.to_owned(),
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

/// Relax permissions under `path`, then remove it.
async fn remove_session_path(path: PathBuf) -> io::Result<()> {
    let target = path.clone();
    if let Err(err) = tokio::task::spawn_blocking(move || clear_readonly(&target)).await {
        debug!(path = %path.display(), %err, "permission relaxing task failed");
    }
    remove_path(&path).await
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Errors worth waiting out: held handles and files still being written.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::DirectoryNotEmpty
    ) || is_sharing_violation(err)
}

#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(32 | 33))
}

#[cfg(not(windows))]
fn is_sharing_violation(_err: &io::Error) -> bool {
    false
}

/// Best effort: make everything under `root` writable so removal cannot
/// fail on read-only attributes.
fn clear_readonly(root: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(root) else {
        return;
    };
    make_writable(root, &meta);
    if !meta.is_dir() {
        return;
    }
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => clear_readonly(&path),
            Ok(kind) if kind.is_symlink() => {}
            Ok(_) => {
                if let Ok(meta) = entry.metadata() {
                    make_writable(&path, &meta);
                }
            }
            Err(err) => debug!(path = %path.display(), %err, "skipping unreadable entry"),
        }
    }
}

#[cfg(unix)]
fn make_writable(path: &Path, meta: &std::fs::Metadata) {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode();
    let wanted = if meta.is_dir() { mode | 0o700 } else { mode | 0o600 };
    if wanted != mode {
        if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(wanted)) {
            debug!(path = %path.display(), %err, "could not relax permissions");
        }
    }
}

#[cfg(not(unix))]
fn make_writable(path: &Path, meta: &std::fs::Metadata) {
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        if let Err(err) = std::fs::set_permissions(path, perms) {
            debug!(path = %path.display(), %err, "could not clear read-only attribute");
        }
    }
}
