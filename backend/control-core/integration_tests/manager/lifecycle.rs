use crate::helpers::{FakeProbe, ScriptLauncher, wait_for_notification};

use control_core::daemon::LaunchOutcome;
use control_core::error::{ControlError, SupervisorError};
use control_core::{COOKIE_FILE_NAME, ControlManager, DaemonConfig, NotificationKind, Notifier};

use std::path::PathBuf;

use tempfile::NamedTempFile;

fn manager(
    config: DaemonConfig,
    launcher: ScriptLauncher,
) -> ControlManager<ScriptLauncher, FakeProbe> {
    ControlManager::with_components(config, launcher, FakeProbe::empty(), Notifier::new())
}

fn data_directory_argument(args: &[String]) -> PathBuf {
    let flag = args
        .iter()
        .position(|a| a == "--DataDirectory")
        .expect("launched without --DataDirectory");
    PathBuf::from(&args[flag + 1])
}

/// **VALUE**: Launching with cookie auth uses a private data directory and its cookie.
///
/// **WHY THIS MATTERS**: The system temp directory is shared by every user and
/// every daemon on the host; a daemon pointed there reads and writes its state
/// and cookie where anything else can too.
///
/// **BUG THIS CATCHES**: Would catch the daemon being given the shared temp
/// directory, or the launch cookie being written into the stored configuration.
#[tokio::test]
async fn given_no_credentials_when_start_daemon_called_then_uses_private_data_directory() {
    // GIVEN: An existing executable and no password or cookie
    let executable = NamedTempFile::new().unwrap();
    let launcher = ScriptLauncher::long_running();
    let manager = manager(DaemonConfig::new(executable.path()), launcher.clone());

    // WHEN: Starting the daemon
    let outcome = manager.start_daemon().await.unwrap();

    // THEN: A fresh directory that exists while the daemon runs
    let data_dir = data_directory_argument(&launcher.launches()[0]);
    assert_ne!(data_dir, std::env::temp_dir());
    assert!(data_dir.is_dir());

    // AND: Connections use its cookie, the stored configuration is untouched
    let expected_cookie = data_dir.join(COOKIE_FILE_NAME);
    assert!(matches!(
        outcome,
        LaunchOutcome::Launched { cookie_path: Some(ref p), .. } if *p == expected_cookie
    ));
    assert_eq!(manager.launched_cookie_path().await, Some(expected_cookie.clone()));
    assert_eq!(manager.effective_config().await.cookie_path, Some(expected_cookie));
    assert_eq!(manager.config().await.cookie_path, None);
    assert!(manager.is_daemon_alive().await);

    // AND: Stopping removes the directory and forgets the cookie
    manager.stop_daemon().await.unwrap();
    assert!(!manager.is_daemon_alive().await);
    assert!(!data_dir.exists());
    assert_eq!(manager.launched_cookie_path().await, None);
}

/// **VALUE**: Every cookie launch gets its own data directory and cookie auth.
///
/// **WHY THIS MATTERS**: After a stop the previous cookie file is gone; a restart
/// must ask for cookie auth again instead of trusting a path that no longer
/// exists.
///
/// **BUG THIS CATCHES**: Would catch the first launch's cookie path leaking into
/// the configuration so the second launch runs with the daemon's defaults.
#[tokio::test]
async fn given_stopped_cookie_daemon_when_started_again_then_uses_new_data_directory() {
    // GIVEN: A daemon launched with cookie auth and then stopped
    let executable = NamedTempFile::new().unwrap();
    let launcher = ScriptLauncher::long_running();
    let manager = manager(DaemonConfig::new(executable.path()), launcher.clone());
    manager.start_daemon().await.unwrap();
    manager.stop_daemon().await.unwrap();

    // WHEN: Starting it again
    let outcome = manager.start_daemon().await.unwrap();

    // THEN: Cookie auth again, in a different directory
    let launches = launcher.launches();
    assert_eq!(launches.len(), 2);
    assert!(launches[1].iter().any(|a| a == "--CookieAuthentication"));
    let first = data_directory_argument(&launches[0]);
    let second = data_directory_argument(&launches[1]);
    assert_ne!(first, second);
    assert!(matches!(
        outcome,
        LaunchOutcome::Launched { cookie_path: Some(ref p), .. } if *p == second.join(COOKIE_FILE_NAME)
    ));

    manager.stop_daemon().await.unwrap();
}

#[tokio::test]
async fn given_missing_executable_when_start_daemon_called_then_reports_error() {
    let launcher = ScriptLauncher::long_running();
    let manager = manager(DaemonConfig::new("/nonexistent/tor"), launcher.clone());
    let mut rx = manager.subscribe();

    let result = manager.start_daemon().await;

    assert!(matches!(
        result,
        Err(ControlError::Supervisor(SupervisorError::ExecutableNotFound { .. }))
    ));
    assert!(launcher.launches().is_empty());
    wait_for_notification(&mut rx, NotificationKind::Error, |m| {
        m.starts_with("Failed to launch Tor")
    })
    .await;
}

#[tokio::test]
async fn given_never_started_when_stop_daemon_called_then_is_noop() {
    let manager = manager(DaemonConfig::new("tor"), ScriptLauncher::long_running());

    manager.stop_daemon().await.unwrap();

    assert!(!manager.is_daemon_alive().await);
}
