// Unit tests for runtime config and persisted settings

use crate::config::{AuthMethod, DaemonConfig, Settings};
use crate::error::config::ConfigError;

use common::RedactedPassword;

use tempfile::{NamedTempFile, tempdir};

#[test]
fn given_nothing_configured_when_auth_method_called_then_returns_none() {
    let config = DaemonConfig::new("tor");
    assert_eq!(config.auth_method(), AuthMethod::None);
    assert_eq!(config.control_port, 9151);
}

/// **VALUE**: The auth method follows password > existing cookie > none.
///
/// **WHY THIS MATTERS**: The methods are mutually exclusive by convention only;
/// the fixed priority is what makes the choice deterministic.
///
/// **BUG THIS CATCHES**: Would catch an empty password or a missing cookie file
/// being treated as configured.
#[test]
fn given_various_fields_when_auth_method_called_then_priority_is_respected() {
    // GIVEN: An existing cookie file
    let cookie = NamedTempFile::new().unwrap();
    let cookie_path = Some(cookie.path().to_path_buf());

    // WHEN/THEN: Password beats cookie
    let both = DaemonConfig::new("tor")
        .with_password(Some(RedactedPassword::new("pw")))
        .with_cookie_path(cookie_path.clone());
    assert_eq!(both.auth_method(), AuthMethod::Password);

    // WHEN/THEN: Empty password is ignored
    let empty_password = DaemonConfig::new("tor")
        .with_password(Some(RedactedPassword::new("")))
        .with_cookie_path(cookie_path);
    assert_eq!(empty_password.auth_method(), AuthMethod::Cookie);

    // WHEN/THEN: Missing cookie file falls through to none
    let missing_cookie =
        DaemonConfig::new("tor").with_cookie_path(Some("/nonexistent/cookie".into()));
    assert_eq!(missing_cookie.auth_method(), AuthMethod::None);
}

/// **VALUE**: Settings survive a save/load cycle and never contain a password.
///
/// **WHY THIS MATTERS**: The settings file is the collaborator's persisted store;
/// it must round-trip the daemon fields and keep secrets out of plain text.
///
/// **BUG THIS CATCHES**: Would catch a broken atomic rename or a password field
/// being added to the persisted shape.
#[test]
fn given_settings_when_saved_and_loaded_then_fields_survive() {
    // GIVEN: Non-default settings
    let dir = tempdir().unwrap();
    let mut settings = Settings::default();
    settings.daemon.executable_path = Some("/opt/tor/tor".into());
    settings.daemon.control_port = 9051;
    settings.daemon.cookie_path = Some("/var/lib/tor/control_auth_cookie".into());

    // WHEN: Saving and loading
    settings.save(dir.path()).unwrap();
    let loaded = Settings::load(dir.path()).unwrap();

    // THEN: Everything round-trips and no temp file is left behind
    assert_eq!(loaded, settings);
    assert!(!dir.path().join("config.json.tmp").exists());

    let raw = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
    assert!(!raw.contains("password"));
}

#[test]
fn given_missing_file_when_load_called_then_returns_defaults() {
    let dir = tempdir().unwrap();
    let loaded = Settings::load(dir.path()).unwrap();
    assert_eq!(loaded, Settings::default());
}

#[test]
fn given_corrupted_file_when_load_called_then_returns_parse_error() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();

    let result = Settings::load(dir.path());

    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

#[test]
fn given_zero_port_when_validated_then_returns_validation_error() {
    let mut settings = Settings::default();
    settings.daemon.control_port = 0;

    let result = settings.validate();

    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
}

#[test]
fn given_settings_when_converted_then_runtime_config_matches() {
    let mut settings = Settings::default();
    settings.daemon.executable_path = Some("/opt/tor/tor".into());
    settings.daemon.control_port = 9051;

    let config =
        DaemonConfig::from_settings(&settings, Some(RedactedPassword::new("secret")));

    assert_eq!(config.executable, std::path::PathBuf::from("/opt/tor/tor"));
    assert_eq!(config.control_port, 9051);
    assert_eq!(config.auth_method(), AuthMethod::Password);
    assert_eq!(config.cookie_path, None);
}
