//! Unit tests for dashboard credential loading.
//!
//! The keychain service `bot-supervisor` has no entries in test
//! environments, so these exercise the env-var fallback and the default.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use bot_supervisor::config::GlobalConfig;

fn make_config() -> (tempfile::TempDir, GlobalConfig) {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!("instance_dir = '{}'\n", temp.path().display());
    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    (temp, config)
}

fn clear_env() {
    std::env::remove_var("DASHBOARD_PASSWORD");
    std::env::remove_var("DASHBOARD_USERNAME");
}

/// Password comes from `DASHBOARD_PASSWORD` when the keychain is empty.
#[tokio::test]
#[serial_test::serial]
async fn password_loaded_from_env() {
    let (_temp, mut config) = make_config();
    clear_env();
    std::env::set_var("DASHBOARD_PASSWORD", "s3cret");

    config.load_credentials().await.expect("loads");
    assert_eq!(config.auth.password, "s3cret");

    clear_env();
}

/// With no source at all the historical default credential is used.
#[tokio::test]
#[serial_test::serial]
async fn default_password_when_unset() {
    let (_temp, mut config) = make_config();
    clear_env();

    config.load_credentials().await.expect("loads");
    assert_eq!(config.auth.password, "bot-bot");
    assert_eq!(config.auth.username, "bot");
}

/// An empty env var counts as unset.
#[tokio::test]
#[serial_test::serial]
async fn empty_env_password_ignored() {
    let (_temp, mut config) = make_config();
    clear_env();
    std::env::set_var("DASHBOARD_PASSWORD", "");

    config.load_credentials().await.expect("loads");
    assert_eq!(config.auth.password, "bot-bot");

    clear_env();
}

/// `DASHBOARD_USERNAME` overrides the configured login name.
#[tokio::test]
#[serial_test::serial]
async fn username_override_from_env() {
    let (_temp, mut config) = make_config();
    clear_env();
    std::env::set_var("DASHBOARD_USERNAME", "operator");

    config.load_credentials().await.expect("loads");
    assert_eq!(config.auth.username, "operator");

    clear_env();
}
