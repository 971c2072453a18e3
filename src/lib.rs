#![forbid(unsafe_code)]

//! `bot-supervisor`: control plane for a long-running messaging bot.
//!
//! Owns the bot child process, derives its connection status, and exposes
//! bot control plus a small order store over HTTP and a local IPC socket.

pub mod config;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod persistence;
pub mod supervisor;
pub mod web;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
