//! Connection status types and disconnect-reason classification.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the bot connection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No live process, or the bot reported a disconnect.
    #[default]
    Disconnected,
    /// Process spawned; no pairing artifact yet.
    Starting,
    /// Pairing artifact present; waiting for the user to scan it.
    AwaitingScan,
    /// Bot reported a live connection.
    Connected,
}

/// User-facing status computed from raw flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DerivedStatus {
    /// Pairing artifact shown, not yet connected.
    Connecting,
    /// Bot connected.
    Connected,
    /// No live process.
    Disconnected,
    /// Process alive, nothing else known yet.
    Starting,
}

impl DerivedStatus {
    /// Derive the user-facing status. The marker takes precedence over the
    /// connected flag so a fresh pairing prompt is always surfaced.
    #[must_use]
    pub fn derive(connected: bool, process_alive: bool, marker_exists: bool) -> Self {
        if marker_exists && !connected {
            Self::Connecting
        } else if connected {
            Self::Connected
        } else if !process_alive {
            Self::Disconnected
        } else {
            Self::Starting
        }
    }
}

/// Consistent view of supervisor state returned by `status()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Whether the bot reported a live connection.
    pub connected: bool,
    /// Whether the owned process is running.
    #[serde(rename = "process_running")]
    pub process_alive: bool,
    /// Whether the pairing artifact exists on disk.
    #[serde(rename = "qr_code_exists")]
    pub marker_exists: bool,
    /// Last user-facing error, if any.
    #[serde(rename = "error")]
    pub last_error: Option<String>,
    /// Derived user-facing status.
    #[serde(rename = "status")]
    pub derived_status: DerivedStatus,
    /// Raw state machine state.
    pub state: ConnectionState,
    /// OS process id of the owned process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Unix timestamp (seconds) when the snapshot was taken.
    pub timestamp: i64,
}

impl StatusSnapshot {
    /// Snapshot for a supervisor that has never started a process.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            connected: false,
            process_alive: false,
            marker_exists: false,
            last_error: None,
            derived_status: DerivedStatus::Disconnected,
            state: ConnectionState::Disconnected,
            pid: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Known causes behind a bot-reported disconnect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectCause {
    /// Session logged out or unpaired on the phone.
    SessionInvalidated,
    /// Browser page closed or refreshed.
    Navigation,
    /// Session opened in another window.
    Conflict,
    /// Browser context crashed mid-call.
    ConnectionLost,
    /// Session files held by another process.
    SessionLocked,
    /// No known pattern matched.
    Unrecognized,
}

static CLASSIFIERS: LazyLock<Vec<(Regex, DisconnectCause)>> = LazyLock::new(|| {
    [
        (r"Cannot read properties", DisconnectCause::ConnectionLost),
        (r"\bEPERM\b|\bEBUSY\b", DisconnectCause::SessionLocked),
        (r"(?i)navigation", DisconnectCause::Navigation),
        (r"(?i)conflict", DisconnectCause::Conflict),
        (
            r"(?i)unpaired|logout|auth(entication)?[ _]fail",
            DisconnectCause::SessionInvalidated,
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, cause)| Regex::new(pattern).ok().map(|re| (re, cause)))
    .collect()
});

impl DisconnectCause {
    /// Classify a raw disconnect reason reported by the bot.
    #[must_use]
    pub fn classify(reason: &str) -> Self {
        CLASSIFIERS
            .iter()
            .find(|(re, _)| re.is_match(reason))
            .map_or(Self::Unrecognized, |(_, cause)| *cause)
    }

    /// User-facing message; unrecognized reasons pass through verbatim.
    #[must_use]
    pub fn message(self, reason: &str) -> String {
        match self {
            Self::SessionInvalidated => {
                "Authentication failed. Please reset the bot and scan the QR code again.".into()
            }
            Self::Navigation => "WhatsApp Web was closed or refreshed. Please reset the bot and scan the QR code again.".into(),
            Self::Conflict => "WhatsApp Web was opened in another window. Please close other sessions and reset the bot.".into(),
            Self::ConnectionLost => {
                "WhatsApp connection lost. Please reset the bot and scan the QR code again.".into()
            }
            Self::SessionLocked => "Session files are locked. Please close any other WhatsApp Web instances and try again.".into(),
            Self::Unrecognized => reason.to_owned(),
        }
    }
}
