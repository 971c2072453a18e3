//! HTTP control plane.
//!
//! Routes map one-to-one onto supervisor operations and order-store
//! operations. Everything except `/health`, `/login`, `/logout`, and the
//! bot's own callback routes sits behind a session cookie.

pub mod auth;
pub mod bot;
pub mod error;
pub mod orders;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::persistence::OrderStore;
use crate::supervisor::Supervisor;
use crate::{AppError, Result};

use self::auth::{Credentials, SessionStore};

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    /// Effective configuration.
    pub config: Arc<GlobalConfig>,
    /// Bot process supervisor.
    pub supervisor: Arc<Supervisor>,
    /// Order records.
    pub orders: OrderStore,
    /// Dashboard login credential.
    pub credentials: Credentials,
    /// Live login sessions.
    pub sessions: SessionStore,
}

impl AppState {
    /// Assemble state from configuration and a running supervisor.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, supervisor: Arc<Supervisor>) -> Self {
        let credentials = Credentials::new(&config.auth.username, &config.auth.password);
        let sessions = SessionStore::new(std::time::Duration::from_secs(
            config.server.session_ttl_seconds,
        ));
        Self {
            orders: OrderStore::new(config.paths.orders.clone()),
            config,
            supervisor,
            credentials,
            sessions,
        }
    }
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the full router.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/start_bot", get(bot::start_bot))
        .route("/stop_bot", get(bot::stop_bot))
        .route("/reset_bot", get(bot::reset_bot))
        .route("/bot_status", get(bot::bot_status))
        .route("/is_bot_ready", get(bot::is_bot_ready))
        .route("/qr_code_exists", get(bot::qr_code_exists))
        .route("/get_qr_code", get(bot::get_qr_code))
        .route("/api/orders", get(orders::list).post(orders::create))
        .route(
            "/api/orders/{id}",
            get(orders::get).put(orders::update).delete(orders::delete),
        )
        .route("/api/orders/export/csv", get(orders::export_csv))
        .route("/api/orders/import/csv", post(orders::import_csv))
        .route("/download_contacts", get(orders::download_contacts))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/set_bot_connected", post(bot::set_bot_connected))
        .route("/set_bot_disconnected", post(bot::set_bot_disconnected))
        .merge(protected)
        .with_state(state)
}

/// Bind `server.host:server.port` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Http` if the address is invalid, the bind fails, or
/// the server stops with an error.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let bind: SocketAddr = addr
        .parse()
        .map_err(|err| AppError::Http(format!("invalid listen address {addr}: {err}")))?;
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind {bind}: {err}")))?;
    serve_http_with_listener(listener, state, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Http` if the server stops with an error.
pub async fn serve_http_with_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("listener has no local address: {err}")))?;
    info!(%local, "starting HTTP control plane");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("HTTP server error: {err}")))?;

    info!("HTTP control plane shut down");
    Ok(())
}
