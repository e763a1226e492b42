// Unit tests for supervisor command construction
// Launch/stop behavior is covered in integration_tests/supervisor.rs

use crate::config::DaemonConfig;
use crate::daemon::supervisor::{
    LaunchAuth, build_hash_command, build_launch_command, parse_hashed_password,
};

use common::RedactedPassword;

use std::ffi::OsStr;
use std::path::PathBuf;

fn args_of(cmd: &tokio::process::Command) -> Vec<String> {
    cmd.as_std()
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

/// **VALUE**: The launch command carries the control port and the hashed password.
///
/// **WHY THIS MATTERS**: The daemon only accepts AUTHENTICATE "<password>" when it
/// was started with the matching `--HashedControlPassword`.
///
/// **BUG THIS CATCHES**: Would catch flag typos or the plain password being passed
/// on the command line.
#[test]
fn given_hashed_password_when_build_launch_command_called_then_passes_hash_flag() {
    // GIVEN: A config and a hashed password
    let config = DaemonConfig::new("/opt/tor/tor").with_control_port(9051);
    let auth = LaunchAuth::HashedPassword("16:ABCDEF".to_string());

    // WHEN: Building the launch command
    let cmd = build_launch_command(&config, &auth);

    // THEN: Program and arguments are as expected
    assert_eq!(cmd.as_std().get_program(), OsStr::new("/opt/tor/tor"));
    assert_eq!(
        args_of(&cmd),
        vec!["--ControlPort", "9051", "--HashedControlPassword", "16:ABCDEF"]
    );
}

/// **VALUE**: Cookie launches point the daemon at a data directory with cookie auth on.
///
/// **WHY THIS MATTERS**: Without a password or known cookie, cookie auth in a
/// directory we control is the only way we can authenticate later.
///
/// **BUG THIS CATCHES**: Would catch the data directory or the enable flag missing.
#[test]
fn given_cookie_launch_when_build_launch_command_called_then_enables_cookie_auth() {
    // GIVEN: Cookie authentication into a temp dir
    let config = DaemonConfig::new("tor");
    let dir = PathBuf::from("/tmp/tor-data");
    let auth = LaunchAuth::CookieInDataDirectory(dir);

    // WHEN: Building the launch command
    let cmd = build_launch_command(&config, &auth);

    // THEN: Data directory and cookie flags follow the control port
    assert_eq!(
        args_of(&cmd),
        vec![
            "--ControlPort",
            "9151",
            "--DataDirectory",
            "/tmp/tor-data",
            "--CookieAuthentication",
            "1"
        ]
    );
}

#[test]
fn given_daemon_default_when_build_launch_command_called_then_only_control_port() {
    let config = DaemonConfig::new("tor").with_control_port(9999);
    let cmd = build_launch_command(&config, &LaunchAuth::DaemonDefault);
    assert_eq!(args_of(&cmd), vec!["--ControlPort", "9999"]);
}

#[test]
fn given_password_when_build_hash_command_called_then_uses_hash_password_flag() {
    let config = DaemonConfig::new("tor");
    let cmd = build_hash_command(&config, &RedactedPassword::new("secret"));
    assert_eq!(args_of(&cmd), vec!["--hash-password", "secret"]);
}

/// **VALUE**: The hash is the last non-empty line of the hashing output.
///
/// **WHY THIS MATTERS**: The daemon may print warnings before the hash; picking
/// the first line would pass a warning as the password hash.
///
/// **BUG THIS CATCHES**: Would catch taking the first line or an empty trailing line.
#[test]
fn given_output_with_noise_when_parse_hashed_password_called_then_returns_last_line() {
    // GIVEN: Output with a warning, the hash and trailing blank lines
    let output = "Oct 15 12:00:00.000 [warn] Something\r\n16:0123456789ABCDEF\r\n\r\n\n";

    // WHEN: Parsing
    let hash = parse_hashed_password(output);

    // THEN: The hash line is returned
    assert_eq!(hash.as_deref(), Some("16:0123456789ABCDEF"));
    assert_eq!(parse_hashed_password("\n\n"), None);
}
