use crate::helpers::{
    NOTIFICATION_TIMEOUT, ScriptLauncher, drain_notifications, wait_for_notification,
};

use control_core::daemon::{LaunchOutcome, ProcessSupervisor};
use control_core::error::SupervisorError;
use control_core::{DaemonConfig, Notification, NotificationKind, Notifier};

use common::RedactedPassword;

use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

fn supervisor(launcher: &ScriptLauncher) -> (ProcessSupervisor<ScriptLauncher>, Notifier) {
    let notifier = Notifier::new();
    (
        ProcessSupervisor::new(launcher.clone(), notifier.clone()),
        notifier,
    )
}

// ============================================================================
// start()
// ============================================================================

/// **VALUE**: Starting twice launches exactly one process.
///
/// **WHY THIS MATTERS**: A second daemon would fight the first over the control
/// and SOCKS ports and fail to start.
///
/// **BUG THIS CATCHES**: Would catch the liveness check being skipped or the
/// handle being replaced on the second call.
#[tokio::test]
async fn given_running_daemon_when_start_called_again_then_launches_once() {
    // GIVEN: A started daemon
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path());
    let launcher = ScriptLauncher::long_running();
    let (mut supervisor, notifier) = supervisor(&launcher);
    let mut rx = notifier.subscribe();

    let first = supervisor.start(&config).await.unwrap();
    assert!(matches!(first, LaunchOutcome::Launched { .. }));

    // WHEN: Starting again
    let second = supervisor.start(&config).await.unwrap();

    // THEN: One launch, second call reports the running daemon
    assert!(matches!(second, LaunchOutcome::AlreadyRunning { .. }));
    assert_eq!(launcher.daemon_launches(), 1);
    wait_for_notification(&mut rx, NotificationKind::Info, |m| {
        m.starts_with("Tor is already running")
    })
    .await;

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn given_cookie_path_known_when_start_called_then_passes_only_control_port() {
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path())
        .with_control_port(9999)
        .with_cookie_path(Some("/var/lib/tor/control_auth_cookie".into()));
    let launcher = ScriptLauncher::long_running();
    let (mut supervisor, _notifier) = supervisor(&launcher);

    let outcome = supervisor.start(&config).await.unwrap();

    assert!(matches!(
        outcome,
        LaunchOutcome::Launched {
            cookie_path: None,
            ..
        }
    ));
    assert_eq!(
        launcher.launches(),
        vec![vec!["--ControlPort".to_string(), "9999".to_string()]]
    );

    supervisor.stop().await.unwrap();
}

/// **VALUE**: A password is hashed by the daemon binary and the hash passed at launch.
///
/// **WHY THIS MATTERS**: The daemon only accepts a hashed control password on the
/// command line; passing the clear password would fail every handshake.
///
/// **BUG THIS CATCHES**: Would catch the notice lines printed before the hash
/// being taken as the hash.
#[tokio::test]
async fn given_password_when_start_called_then_launches_with_hashed_password() {
    // GIVEN: A hash command that prints noise before the hash
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path())
        .with_password(Some(RedactedPassword::new("secret")));
    let launcher = ScriptLauncher::long_running()
        .with_hash_script("echo '[notice] Tor can be configured'; echo; echo '16:C0FFEE'");
    let (mut supervisor, _notifier) = supervisor(&launcher);

    // WHEN: Starting
    supervisor.start(&config).await.unwrap();

    // THEN: Hashing first, then the launch with the parsed hash
    assert_eq!(
        launcher.launches(),
        vec![
            vec!["--hash-password".to_string(), "secret".to_string()],
            vec![
                "--ControlPort".to_string(),
                "9151".to_string(),
                "--HashedControlPassword".to_string(),
                "16:C0FFEE".to_string(),
            ],
        ]
    );

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn given_silent_hash_command_when_start_called_then_returns_password_hash_error() {
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path())
        .with_password(Some(RedactedPassword::new("secret")));
    let launcher = ScriptLauncher::long_running().with_hash_script("exit 1");
    let (mut supervisor, _notifier) = supervisor(&launcher);

    let result = supervisor.start(&config).await;

    assert!(matches!(result, Err(SupervisorError::PasswordHash { .. })));
    assert_eq!(launcher.daemon_launches(), 0);
    assert!(!supervisor.is_alive());
}

/// **VALUE**: A hash command that exits non-zero fails the launch even if it printed.
///
/// **WHY THIS MATTERS**: The daemon prints warnings and errors on stdout too; the
/// last line of a failed run is not a hash, and launching with it leaves a daemon
/// no password can unlock.
///
/// **BUG THIS CATCHES**: Would catch the exit status being ignored and whatever
/// was printed last being taken as the hash.
#[tokio::test]
async fn given_failing_hash_command_with_output_when_start_called_then_returns_password_hash_error() {
    // GIVEN: A hash command that prints a plausible line and then fails
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path())
        .with_password(Some(RedactedPassword::new("secret")));
    let launcher = ScriptLauncher::long_running().with_hash_script("echo '16:NOTAHASH'; exit 1");
    let (mut supervisor, _notifier) = supervisor(&launcher);

    // WHEN: Starting
    let result = supervisor.start(&config).await;

    // THEN: Hashing fails and no daemon is launched
    assert!(matches!(result, Err(SupervisorError::PasswordHash { .. })));
    assert_eq!(launcher.daemon_launches(), 0);
    assert!(!supervisor.is_alive());
}

#[tokio::test]
async fn given_hanging_hash_command_when_start_called_then_times_out() {
    let executable = NamedTempFile::new().unwrap();
    let mut config = DaemonConfig::new(executable.path())
        .with_password(Some(RedactedPassword::new("secret")));
    config.launch_timeout = Duration::from_millis(100);
    let launcher = ScriptLauncher::long_running().with_hash_script("exec sleep 30");
    let (mut supervisor, _notifier) = supervisor(&launcher);

    let result = supervisor.start(&config).await;

    assert!(matches!(result, Err(SupervisorError::Timeout { .. })));
}

#[tokio::test]
async fn given_missing_executable_when_start_called_then_nothing_is_spawned() {
    let launcher = ScriptLauncher::long_running();
    let (mut supervisor, _notifier) = supervisor(&launcher);

    let result = supervisor.start(&DaemonConfig::new("/nonexistent/tor")).await;

    assert!(matches!(
        result,
        Err(SupervisorError::ExecutableNotFound { .. })
    ));
    assert!(launcher.launches().is_empty());
}

// ============================================================================
// Output forwarding and exit
// ============================================================================

/// **VALUE**: Daemon stdout becomes Info and stderr becomes Error notifications,
/// and a natural exit is announced.
///
/// **WHY THIS MATTERS**: Bootstrap progress and startup failures are only visible
/// through the daemon's own output.
///
/// **BUG THIS CATCHES**: Would catch stderr being dropped or the exit going unnoticed.
#[tokio::test]
async fn given_daemon_output_when_running_then_lines_are_forwarded() {
    // GIVEN: A daemon that prints on both streams and exits
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path());
    let launcher = ScriptLauncher::new("echo 'Bootstrapped 100% (done)'; echo 'bind failed' >&2");
    let (mut supervisor, notifier) = supervisor(&launcher);
    let mut rx = notifier.subscribe();

    // WHEN: Starting and letting it run to completion
    supervisor.start(&config).await.unwrap();
    let seen = collect_until(&mut rx, |seen| {
        seen.iter().any(|n| n.message == "bind failed")
            && seen.iter().any(|n| n.message == "Bootstrapped 100% (done)")
            && seen.iter().any(|n| n.message.starts_with("Tor process exited"))
    })
    .await;

    // THEN: Each line arrived with the right kind
    assert!(seen.contains(&Notification {
        kind: NotificationKind::Info,
        message: "Bootstrapped 100% (done)".to_string(),
    }));
    assert!(seen.contains(&Notification {
        kind: NotificationKind::Error,
        message: "bind failed".to_string(),
    }));

    // THEN: The supervisor sees the exit, and stopping is a no-op
    for _ in 0..50 {
        if !supervisor.is_alive() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(!supervisor.is_alive());
    supervisor.stop().await.unwrap();
}

/// Receive notifications until `done` holds for everything seen so far.
async fn collect_until<F>(rx: &mut broadcast::Receiver<Notification>, done: F) -> Vec<Notification>
where
    F: Fn(&[Notification]) -> bool,
{
    let mut seen = Vec::new();
    timeout(NOTIFICATION_TIMEOUT, async {
        while !done(&seen) {
            if let Ok(n) = rx.recv().await {
                seen.push(n);
            }
        }
    })
    .await
    .expect("Timed out waiting for daemon output");
    seen
}

/// **VALUE**: Cookie launches run in a private directory that lives as long as the daemon.
///
/// **WHY THIS MATTERS**: The daemon keeps its state and control cookie in its
/// data directory; sharing the system temp directory exposes both.
///
/// **BUG THIS CATCHES**: Would catch the shared temp directory being reused, or
/// the private directory outliving a stopped daemon.
#[tokio::test]
async fn given_no_credentials_when_start_called_then_creates_private_data_directory() {
    // GIVEN: No password and no cookie path
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path());
    let launcher = ScriptLauncher::long_running();
    let (mut supervisor, _notifier) = supervisor(&launcher);

    // WHEN: Starting
    supervisor.start(&config).await.unwrap();

    // THEN: The daemon gets a fresh existing directory
    let data_dir = supervisor.data_directory().unwrap();
    assert_ne!(data_dir, std::env::temp_dir());
    assert!(data_dir.is_dir());
    let args = &launcher.launches()[0];
    let flag = args.iter().position(|a| a == "--DataDirectory").unwrap();
    assert_eq!(args[flag + 1], data_dir.to_string_lossy());

    // AND: Stopping removes it
    supervisor.stop().await.unwrap();
    assert!(!data_dir.exists());
    assert_eq!(supervisor.data_directory(), None);
}

// ============================================================================
// stop()
// ============================================================================

#[tokio::test]
async fn given_running_daemon_when_stop_called_then_process_is_killed() {
    // GIVEN: A long-running daemon
    let executable = NamedTempFile::new().unwrap();
    let config = DaemonConfig::new(executable.path());
    let launcher = ScriptLauncher::long_running();
    let (mut supervisor, notifier) = supervisor(&launcher);
    let mut rx = notifier.subscribe();
    supervisor.start(&config).await.unwrap();
    assert!(supervisor.is_alive());

    // WHEN: Stopping twice
    supervisor.stop().await.unwrap();
    supervisor.stop().await.unwrap();

    // THEN: Dead, stop announced once
    assert!(!supervisor.is_alive());
    assert_eq!(supervisor.pid(), None);
    let stops = drain_notifications(&mut rx)
        .into_iter()
        .filter(|n| n.message.starts_with("Tor process stopped"))
        .count();
    assert_eq!(stops, 1);
}
