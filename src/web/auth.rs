//! Dashboard login sessions.
//!
//! A single shared credential. The password is kept only as a SHA-256
//! digest and compared digest-to-digest. A successful login issues a random
//! token in the `bot_supervisor_session` cookie; tokens live in memory and
//! expire after the configured TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{FromRequest, Request, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::AppError;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "bot_supervisor_session";

/// The single accepted login.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password_digest: [u8; 32],
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Build from plain-text values; only the password digest is retained.
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password_digest: digest(password),
        }
    }

    /// Whether `username`/`password` match.
    #[must_use]
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = digest(username) == digest(&self.username);
        let pass_ok = digest(password) == self.password_digest;
        user_ok & pass_ok
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// In-memory session tokens with expiry.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    tokens: Mutex<HashMap<String, Instant>>,
}

impl SessionStore {
    /// Empty store whose sessions last `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a new token.
    pub fn issue(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        tokens.retain(|_, expires| *expires > now);
        tokens.insert(token.clone(), now + self.ttl);
        token
    }

    /// Whether `token` is live.
    #[must_use]
    pub fn is_valid(&self, token: &str) -> bool {
        let tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens
            .get(token)
            .is_some_and(|expires| *expires > Instant::now())
    }

    /// Drop `token`.
    pub fn revoke(&self, token: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }

    /// Session lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Extract the session token from the `Cookie` header.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

/// Login form, accepted as JSON or URL-encoded.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

/// `POST /login`.
pub async fn login(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let form = if is_json {
        Json::<LoginRequest>::from_request(request, &())
            .await
            .map(|Json(form)| form)
            .map_err(|err| err.body_text())
    } else {
        Form::<LoginRequest>::from_request(request, &())
            .await
            .map(|Form(form)| form)
            .map_err(|err| err.body_text())
    };
    let form = match form {
        Ok(form) => form,
        Err(message) => return AppError::BadRequest(message).into_response(),
    };

    if !state.credentials.verify(&form.username, &form.password) {
        warn!(username = %form.username, "dashboard login rejected");
        return AppError::Unauthorized("Invalid credentials".into()).into_response();
    }

    let token = state.sessions.issue();
    info!(username = %form.username, "dashboard login accepted");
    let cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.sessions.ttl().as_secs()
    );
    let mut response = Json(json!({ "message": "Logged in" })).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
    response
}

/// `GET /logout`.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token);
    }
    let mut response = Json(json!({ "message": "Logged out" })).into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_static("bot_supervisor_session=; Path=/; HttpOnly; Max-Age=0"),
    );
    response
}

/// Middleware rejecting requests without a live session.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = session_token(request.headers())
        .is_some_and(|token| state.sessions.is_valid(&token));
    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Login required" })),
        )
            .into_response()
    }
}
