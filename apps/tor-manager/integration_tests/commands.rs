use tor_manager::cli::{Cli, ConfigAction, PASSWORD_ENV_VAR};
use tor_manager::commands::{Context, config, find_in_path};

use control_core::{AuthMethod, Settings};

use clap::Parser;
use serial_test::serial;
use tempfile::tempdir;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("tor-manager").chain(args.iter().copied())).unwrap()
}

/// **VALUE**: Command-line overrides win over the settings file.
///
/// **WHY THIS MATTERS**: `--port` and `--executable` are how a user points a
/// single invocation at a different daemon without rewriting their settings.
///
/// **BUG THIS CATCHES**: Would catch overrides being ignored or being written
/// back into the settings.
#[test]
#[serial]
fn given_overrides_when_daemon_config_built_then_overrides_win() {
    // GIVEN: Saved settings with a port and executable
    let dir = tempdir().unwrap();
    let mut settings = Settings::default();
    settings.daemon.control_port = 9051;
    settings.daemon.executable_path = Some("/usr/sbin/tor".into());
    settings.save(dir.path()).unwrap();

    // WHEN: Loading with overrides
    let cli = parse(&[
        "--config-dir",
        dir.path().to_str().unwrap(),
        "--port",
        "9999",
        "--executable",
        "/opt/tor/tor",
        "status",
    ]);
    let context = Context::load(&cli).unwrap();
    let daemon = context.daemon_config();

    // THEN: Overrides apply to the runtime config only
    assert_eq!(daemon.control_port, 9999);
    assert_eq!(daemon.executable, std::path::PathBuf::from("/opt/tor/tor"));
    assert_eq!(context.settings.daemon.control_port, 9051);
}

/// **VALUE**: The password can come from the environment and is never saved.
///
/// **WHY THIS MATTERS**: Passing secrets as arguments exposes them in the
/// process list; the environment variable is the safe channel.
///
/// **BUG THIS CATCHES**: Would catch the env binding being lost, or the
/// password leaking into the settings file.
#[test]
#[serial]
fn given_password_env_var_when_loaded_then_password_auth_is_used() {
    // GIVEN: The password in the environment
    let dir = tempdir().unwrap();
    // SAFETY: serialized with the other env-reading tests
    unsafe { std::env::set_var(PASSWORD_ENV_VAR, "from-env") };

    // WHEN: Loading and saving the settings
    let cli = parse(&["--config-dir", dir.path().to_str().unwrap(), "status"]);
    let context = Context::load(&cli);
    unsafe { std::env::remove_var(PASSWORD_ENV_VAR) };
    let context = context.unwrap();
    context.settings.save(dir.path()).unwrap();

    // THEN: Password auth, nothing secret on disk
    let daemon = context.daemon_config();
    assert_eq!(daemon.auth_method(), AuthMethod::Password);
    assert_eq!(daemon.control_password.unwrap().expose(), "from-env");

    let raw = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
    assert!(!raw.contains("from-env"));
}

#[test]
#[serial]
fn given_blank_password_when_loaded_then_no_password_auth() {
    let dir = tempdir().unwrap();
    let cli = parse(&[
        "--config-dir",
        dir.path().to_str().unwrap(),
        "--password",
        "",
        "status",
    ]);

    let context = Context::load(&cli).unwrap();

    assert!(context.password.is_none());
    assert_eq!(context.daemon_config().auth_method(), AuthMethod::None);
}

/// **VALUE**: `config set` persists only the fields it was given.
///
/// **WHY THIS MATTERS**: Changing the port must not wipe the stored executable.
///
/// **BUG THIS CATCHES**: Would catch unset flags overwriting stored values with None.
#[test]
#[serial]
fn given_config_set_when_executed_then_only_given_fields_change() {
    // GIVEN: Stored executable and cookie
    let dir = tempdir().unwrap();
    let mut settings = Settings::default();
    settings.daemon.executable_path = Some("/usr/sbin/tor".into());
    settings.daemon.cookie_path = Some("/var/lib/tor/control_auth_cookie".into());
    settings.save(dir.path()).unwrap();

    let cli = parse(&["--config-dir", dir.path().to_str().unwrap(), "config", "show"]);
    let mut context = Context::load(&cli).unwrap();

    // WHEN: Setting only the port and clearing the cookie
    config::execute(
        &mut context,
        ConfigAction::Set {
            executable_path: None,
            control_port: Some(9251),
            cookie_path: None,
            clear_cookie: true,
        },
    )
    .unwrap();

    // THEN: Port changed, cookie cleared, executable kept
    let reloaded = Settings::load(dir.path()).unwrap();
    assert_eq!(reloaded.daemon.control_port, 9251);
    assert_eq!(reloaded.daemon.cookie_path, None);
    assert_eq!(
        reloaded.daemon.executable_path,
        Some("/usr/sbin/tor".into())
    );
}

#[test]
#[serial]
fn given_zero_port_when_config_set_then_save_is_rejected() {
    let dir = tempdir().unwrap();
    let cli = parse(&["--config-dir", dir.path().to_str().unwrap(), "config", "show"]);
    let mut context = Context::load(&cli).unwrap();

    let result = config::execute(
        &mut context,
        ConfigAction::Set {
            executable_path: None,
            control_port: Some(0),
            cookie_path: None,
            clear_cookie: false,
        },
    );

    assert!(result.is_err());
    assert!(!dir.path().join("config.json").exists());
}

#[test]
fn given_missing_binary_when_searching_path_then_returns_none() {
    assert_eq!(find_in_path("definitely-not-an-installed-binary"), None);
}
