//! Local IPC layer for `bot-supervisor-ctl`.
//!
//! A named pipe (Windows) or Unix domain socket (Linux/macOS) accepting
//! JSON-line commands that map one-to-one onto supervisor operations.

pub mod server;

/// Environment variable holding the optional IPC shared secret.
pub const IPC_TOKEN_ENV: &str = "BOT_SUPERVISOR_IPC_TOKEN";
