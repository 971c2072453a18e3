//! Connection state machine.
//!
//! Holds the discrete [`ConnectionState`] plus the last user-facing error.
//! Only the supervisor mutates it, always under its lock.

use tracing::debug;

use crate::models::status::{ConnectionState, DisconnectCause};

/// Inputs that move the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// A new process was spawned.
    Started,
    /// The pairing marker was observed on disk.
    MarkerAppeared,
    /// The bot reported a live connection.
    Connected,
    /// The bot reported a disconnect, optionally with a raw reason.
    Disconnected {
        /// Raw reason as reported by the bot.
        reason: Option<String>,
    },
    /// The process exited on its own.
    Exited {
        /// Error to surface, if the exit was abnormal.
        error: Option<String>,
    },
    /// The process was stopped on request.
    Stopped,
    /// An operation failed and left no usable process behind.
    Failed {
        /// User-facing failure message.
        error: String,
    },
}

/// Discrete connection state plus the last error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    last_error: Option<String>,
}

impl ConnectionStateMachine {
    /// Fresh machine in `Disconnected` with no error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last user-facing error.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the bot is currently believed connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Apply an event and return the resulting state.
    pub fn apply(&mut self, event: StateEvent) -> ConnectionState {
        let previous = self.state;
        match event {
            StateEvent::Started => {
                self.state = ConnectionState::Starting;
                self.last_error = None;
            }
            StateEvent::MarkerAppeared => {
                if self.state == ConnectionState::Starting {
                    self.state = ConnectionState::AwaitingScan;
                }
            }
            StateEvent::Connected => {
                self.state = ConnectionState::Connected;
                self.last_error = None;
            }
            StateEvent::Disconnected { reason } => {
                self.state = ConnectionState::Disconnected;
                if let Some(reason) = reason {
                    let cause = DisconnectCause::classify(&reason);
                    debug!(?cause, "disconnect reason classified");
                    self.last_error = Some(cause.message(&reason));
                }
            }
            StateEvent::Exited { error } => {
                self.state = ConnectionState::Disconnected;
                if error.is_some() {
                    self.last_error = error;
                }
            }
            StateEvent::Stopped => {
                self.state = ConnectionState::Disconnected;
            }
            StateEvent::Failed { error } => {
                self.state = ConnectionState::Disconnected;
                self.last_error = Some(error);
            }
        }
        if previous != self.state {
            debug!(from = ?previous, to = ?self.state, "connection state changed");
        }
        self.state
    }
}
