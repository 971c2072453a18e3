//! Bot process monitor: detects unexpected exits between operations.
//!
//! The supervisor only notices a crashed bot when something touches it.
//! This task polls at a fixed interval so the published status flips to
//! `disconnected` even when nobody is asking.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::process::describe_exit;
use super::Supervisor;

/// Spawn a background task that reaps the bot process after it exits.
///
/// Polls every `interval` until `cancel` fires. Polls that find the
/// supervisor busy are skipped; the in-flight operation reconciles on its
/// own.
#[must_use]
pub fn spawn_child_monitor(
    supervisor: Arc<Supervisor>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("bot process monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            match supervisor.reap_if_idle().await {
                Some(status) => {
                    info!(status = %describe_exit(status), "bot process exit detected by monitor");
                }
                None => debug!("bot process monitor tick"),
            }
        }
    })
}
