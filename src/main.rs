#![forbid(unsafe_code)]

//! `bot-supervisor`: messaging-bot supervisor and dashboard server.
//!
//! Bootstraps configuration, starts the HTTP control plane, the IPC server
//! for `bot-supervisor-ctl`, and the bot process monitor, then waits for a
//! shutdown signal and stops the bot before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use bot_supervisor::config::GlobalConfig;
use bot_supervisor::ipc::{server::spawn_ipc_server, IPC_TOKEN_ENV};
use bot_supervisor::supervisor::child_monitor::spawn_child_monitor;
use bot_supervisor::supervisor::Supervisor;
use bot_supervisor::web::{self, AppState};
use bot_supervisor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bot-supervisor", about = "Messaging-bot supervisor and dashboard", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the instance directory (bot working directory).
    #[arg(long)]
    instance_dir: Option<PathBuf>,

    /// Start the bot immediately, regardless of `bot.autostart`.
    #[arg(long)]
    autostart: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("bot-supervisor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::from_toml_str("")?,
    };
    if let Some(dir) = args.instance_dir {
        config = config.with_instance_dir(dir)?;
    }
    config.load_credentials().await?;

    let config = Arc::new(config);
    info!(instance_dir = %config.instance_dir.display(), "configuration loaded");

    // ── Build shared application state ──────────────────
    let supervisor = Arc::new(Supervisor::new(Arc::clone(&config)));
    let state = Arc::new(AppState::new(Arc::clone(&config), Arc::clone(&supervisor)));
    info!(orders = %state.orders.path().display(), "order store ready");
    let ct = CancellationToken::new();

    // ── Start background services ───────────────────────
    let monitor_handle = spawn_child_monitor(
        Arc::clone(&supervisor),
        config.monitor_interval(),
        ct.clone(),
    );

    let ipc_token = std::env::var(IPC_TOKEN_ENV).ok().filter(|t| !t.is_empty());
    let ipc_handle = match spawn_ipc_server(Arc::clone(&supervisor), ipc_token, ct.clone()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(%err, "IPC server unavailable; continuing with HTTP only");
            None
        }
    };

    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let http_handle = tokio::spawn(async move {
        if let Err(err) = web::serve_http(http_state, http_ct.clone()).await {
            error!(%err, "HTTP control plane failed");
            http_ct.cancel();
        }
    });

    if args.autostart || config.bot.autostart {
        let response = supervisor.start().await;
        if response.error {
            error!(message = %response.message, "autostart failed");
        } else {
            info!(message = %response.message, "autostart");
        }
    }

    info!("bot-supervisor ready");

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => warn!("service failure, shutting down"),
    }
    ct.cancel();

    let response = supervisor.stop().await;
    info!(message = %response.message, "bot stopped for shutdown");

    // ── Wait for background tasks ───────────────────────
    let _ = tokio::join!(http_handle, monitor_handle);
    if let Some(handle) = ipc_handle {
        let _ = handle.await;
    }
    info!("bot-supervisor shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
