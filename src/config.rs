//! Global configuration parsing, validation, and credential loading.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name used for the dashboard credential.
const KEYRING_SERVICE: &str = "bot-supervisor";

/// HTTP control-plane settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ServerConfig {
    /// Interface the HTTP server binds to.
    pub host: String,
    /// TCP port; `0` lets the OS pick one.
    pub port: u16,
    /// Lifetime of a dashboard login session.
    pub session_ttl_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            session_ttl_seconds: 24 * 60 * 60,
        }
    }
}

/// Single shared dashboard credential.
///
/// The password is loaded at runtime via OS keychain or environment
/// variable, not from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AuthConfig {
    /// Dashboard login name.
    pub username: String,
    /// Dashboard password (populated at runtime).
    #[serde(skip)]
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "bot".into(),
            password: String::new(),
        }
    }
}

/// How to launch the bot process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct BotConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Base environment flags layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Start the bot as soon as the supervisor boots.
    pub autostart: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command: "node".into(),
            args: vec!["index.js".into()],
            env: BTreeMap::from([
                ("NODE_ENV".to_owned(), "production".to_owned()),
                ("DEBUG".to_owned(), "1".to_owned()),
            ]),
            autostart: false,
        }
    }
}

/// Session artifacts and data files. Relative paths resolve against
/// [`GlobalConfig::instance_dir`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct PathsConfig {
    /// Persisted authentication state written by the bot.
    pub auth_dir: PathBuf,
    /// Browser cache state written by the bot.
    pub cache_dir: PathBuf,
    /// Pairing artifact the bot writes while awaiting a scan.
    pub marker: PathBuf,
    /// Order records JSON file.
    pub orders: PathBuf,
    /// Contacts JSON file (`{number: name}`).
    pub contacts: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            auth_dir: ".wwebjs_auth".into(),
            cache_dir: ".wwebjs_cache".into(),
            marker: "qr_code.png".into(),
            orders: "delivery_data.json".into(),
            contacts: "contacts.json".into(),
        }
    }
}

/// Bounds for every blocking wait in the supervisor (milliseconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeoutConfig {
    /// Cooperative termination window before a forced kill.
    pub grace_ms: u64,
    /// Window in which an early exit after `start` is reported as a failure.
    pub warmup_ms: u64,
    /// Total deadline for the marker to appear during `reset`.
    pub marker_wait_ms: u64,
    /// Poll interval for marker and liveness checks.
    pub marker_poll_ms: u64,
    /// Pause after termination so the OS releases file handles.
    pub release_delay_ms: u64,
    /// Child monitor poll interval.
    pub monitor_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            grace_ms: 5_000,
            warmup_ms: 3_000,
            marker_wait_ms: 30_000,
            marker_poll_ms: 500,
            release_delay_ms: 2_000,
            monitor_interval_ms: 2_000,
        }
    }
}

/// Session directory removal retry policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CleanupConfig {
    /// Removal attempts per directory.
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `n * backoff_ms`.
    pub backoff_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 2_000,
        }
    }
}

impl PathsConfig {
    fn iter_mut(&mut self) -> impl Iterator<Item = &mut PathBuf> {
        [
            &mut self.auth_dir,
            &mut self.cache_dir,
            &mut self.marker,
            &mut self.orders,
            &mut self.contacts,
        ]
        .into_iter()
    }
}

fn default_instance_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_ipc_name() -> String {
    "bot-supervisor".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Working directory of the bot and base for relative paths.
    #[serde(default = "default_instance_dir")]
    pub instance_dir: PathBuf,
    /// Named pipe / Unix socket identifier.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// HTTP settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Dashboard credential.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Bot launch settings.
    #[serde(default)]
    pub bot: BotConfig,
    /// Session artifact and data file locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Wait bounds.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Cleanup retry policy.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the instance directory and re-resolve relative paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the directory does not exist.
    pub fn with_instance_dir(mut self, dir: impl Into<PathBuf>) -> Result<Self> {
        let old_root = std::mem::replace(&mut self.instance_dir, dir.into());
        for path in self.paths.iter_mut() {
            if let Ok(relative) = path.strip_prefix(&old_root) {
                *path = relative.to_owned();
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Load the dashboard password from OS keychain with env-var fallback.
    ///
    /// Falls back to the historical default credential with a warning when
    /// neither source provides one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.auth.password =
            match load_credential("dashboard_password", "DASHBOARD_PASSWORD").await? {
                Some(password) => password,
                None => {
                    warn!("no dashboard password configured; using the default credential");
                    "bot-bot".into()
                }
            };
        if let Ok(username) = env::var("DASHBOARD_USERNAME") {
            if !username.is_empty() {
                self.auth.username = username;
            }
        }
        Ok(())
    }

    /// Grace window before a forced kill.
    #[must_use]
    pub fn grace_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.grace_ms)
    }

    /// Early-exit detection window after `start`.
    #[must_use]
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.timeouts.warmup_ms)
    }

    /// Total marker deadline during `reset`.
    #[must_use]
    pub fn marker_wait(&self) -> Duration {
        Duration::from_millis(self.timeouts.marker_wait_ms)
    }

    /// Marker and liveness poll interval.
    #[must_use]
    pub fn marker_poll(&self) -> Duration {
        Duration::from_millis(self.timeouts.marker_poll_ms)
    }

    /// Handle-release pause between termination and cleanup.
    #[must_use]
    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.timeouts.release_delay_ms)
    }

    /// Child monitor poll interval.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.monitor_interval_ms)
    }

    /// Base cleanup backoff.
    #[must_use]
    pub fn cleanup_backoff(&self) -> Duration {
        Duration::from_millis(self.cleanup.backoff_ms)
    }

    fn validate(&mut self) -> Result<()> {
        if self.bot.command.trim().is_empty() {
            return Err(AppError::Config("bot.command must not be empty".into()));
        }

        if self.cleanup.max_attempts == 0 {
            return Err(AppError::Config(
                "cleanup.max_attempts must be greater than zero".into(),
            ));
        }

        if self.timeouts.marker_poll_ms == 0 || self.timeouts.monitor_interval_ms == 0 {
            return Err(AppError::Config(
                "poll intervals must be greater than zero".into(),
            ));
        }

        let canonical_root = self
            .instance_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("instance_dir invalid: {err}")))?;

        let resolve = |path: &Path| -> PathBuf {
            if path.is_absolute() {
                path.to_owned()
            } else {
                canonical_root.join(path)
            }
        };
        for path in self.paths.iter_mut() {
            *path = resolve(path);
        }
        self.instance_dir = canonical_root;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            tracing::debug!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}
