use crate::helpers::{FakeProbe, ScriptLauncher, drain_notifications, wait_for_notification};

use control_core::error::{ControlError, DiscoveryError};
use control_core::{ControlManager, DaemonConfig, NotificationKind, Notifier};

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// A browser bundle layout: `<root>/Browser/TorBrowser/{Tor/tor, Data/Tor}`.
struct Bundle {
    _root: TempDir,
    executable: PathBuf,
    data_dir: PathBuf,
}

impl Bundle {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let tor_dir = root.path().join("Browser").join("TorBrowser").join("Tor");
        let data_dir = root
            .path()
            .join("Browser")
            .join("TorBrowser")
            .join("Data")
            .join("Tor");
        fs::create_dir_all(&tor_dir).unwrap();
        fs::create_dir_all(&data_dir).unwrap();

        let executable = tor_dir.join("tor");
        fs::write(&executable, b"").unwrap();

        Self {
            _root: root,
            executable,
            data_dir,
        }
    }

    fn with_cookie(self) -> Self {
        fs::write(self.data_dir.join("control_auth_cookie"), [7u8; 32]).unwrap();
        self
    }

    fn with_torrc(self, contents: &str) -> Self {
        fs::write(self.data_dir.join("torrc"), contents).unwrap();
        self
    }

    fn probe(&self, command_line: &str) -> FakeProbe {
        FakeProbe::with_process(4242, &path_str(&self.executable), command_line)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn manager(probe: FakeProbe) -> ControlManager<ScriptLauncher, FakeProbe> {
    ControlManager::with_components(
        DaemonConfig::new("tor"),
        ScriptLauncher::long_running(),
        probe,
        Notifier::new(),
    )
}

/// **VALUE**: A port from the command line is adopted once the process is seen
/// listening on it.
///
/// **WHY THIS MATTERS**: A daemon started by the browser uses its own control
/// port; connecting to the default one would fail.
///
/// **BUG THIS CATCHES**: Would catch discovery adopting the configured port even
/// though the process listens elsewhere.
#[tokio::test]
async fn given_listening_argument_port_when_gathering_then_config_adopts_it() {
    // GIVEN: A daemon started with __ControlPort 9251 and listening on it
    let bundle = Bundle::new().with_cookie();
    let probe = bundle
        .probe("tor +__ControlPort 127.0.0.1:9251 +__SocksPort 9250")
        .listening_on(&[9250, 9251]);
    let manager = manager(probe);
    let mut rx = manager.subscribe();

    // WHEN: Gathering process info
    let result = manager.gather_process_info().await.unwrap();

    // THEN: Port confirmed, config updated, cookie adopted
    assert_eq!(result.pid, 4242);
    assert_eq!(result.candidate_ports, vec![9151, 9251]);
    assert_eq!(result.confirmed_port, Some(9251));
    assert!(!result.is_ambiguous());

    let config = manager.config().await;
    assert_eq!(config.control_port, 9251);
    assert_eq!(
        config.cookie_path,
        Some(bundle.data_dir.join("control_auth_cookie"))
    );

    let report = wait_for_notification(&mut rx, NotificationKind::Info, |m| {
        m.contains("Confirmed control port 9251")
    })
    .await;
    assert!(report.message.contains("Found ControlPort 9251 in arguments"));
    assert!(report.message.contains("Process is listening on port 9250"));
}

/// **VALUE**: An unconfirmed candidate never replaces the configured port.
///
/// **WHY THIS MATTERS**: Command lines and torrc files can list ports the daemon
/// failed to bind; only the listen table is authoritative.
///
/// **BUG THIS CATCHES**: Would catch the first argument port being adopted blindly.
#[tokio::test]
async fn given_unconfirmed_port_when_gathering_then_config_port_unchanged() {
    let bundle = Bundle::new();
    let probe = bundle.probe("tor --ControlPort 9051").listening_on(&[9050]);
    let manager = manager(probe);

    let result = manager.gather_process_info().await.unwrap();

    assert_eq!(result.confirmed_port, None);
    assert_eq!(result.cookie_path, None);
    let config = manager.config().await;
    assert_eq!(config.control_port, 9151);
    assert_eq!(config.cookie_path, None);
}

#[tokio::test]
async fn given_torrc_port_when_gathering_then_torrc_port_is_confirmed() {
    let bundle = Bundle::new().with_torrc("# comment\nControlPort 9351\nSocksPort 9350\n");
    let probe = bundle.probe("tor").listening_on(&[9351]);
    let manager = manager(probe);

    let result = manager.gather_process_info().await.unwrap();

    assert_eq!(result.candidate_ports, vec![9151, 9351]);
    assert_eq!(result.confirmed_port, Some(9351));
    assert_eq!(manager.config().await.control_port, 9351);
}

/// **VALUE**: A malformed torrc line is reported and skipped.
///
/// **WHY THIS MATTERS**: Discovery is best effort; one bad line must not hide
/// the ports on the others.
///
/// **BUG THIS CATCHES**: Would catch a parse failure aborting discovery.
#[tokio::test]
async fn given_malformed_torrc_line_when_gathering_then_reports_error_and_continues() {
    // GIVEN: A torrc with one unparseable and one valid ControlPort
    let bundle = Bundle::new().with_torrc("ControlPort auto\nControlPort 9451\n");
    let probe = bundle.probe("tor").listening_on(&[9451]);
    let manager = manager(probe);
    let mut rx = manager.subscribe();

    // WHEN: Gathering
    let result = manager.gather_process_info().await.unwrap();

    // THEN: The valid port wins and the bad line produced an Error notification
    assert_eq!(result.confirmed_port, Some(9451));
    let errors: Vec<String> = drain_notifications(&mut rx)
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Error)
        .map(|n| n.message)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("line 1"));
    assert!(errors[0].contains("\"auto\""));
}

#[tokio::test]
async fn given_several_data_directories_when_gathering_then_result_is_ambiguous() {
    let bundle = Bundle::new();
    let probe = bundle.probe("tor --DataDirectory /var/lib/tor");
    let manager = manager(probe);

    let result = manager.gather_process_info().await.unwrap();

    assert!(result.is_ambiguous());
    assert_eq!(result.data_directories[0], PathBuf::from("/var/lib/tor"));
    assert_eq!(result.data_directories[1], bundle.data_dir);
}

/// **VALUE**: No running daemon is an error the caller and the user both see.
///
/// **WHY THIS MATTERS**: "Gather info" on a machine without the daemon must say
/// so rather than silently keeping stale configuration.
///
/// **BUG THIS CATCHES**: Would catch an empty process list being treated as success.
#[tokio::test]
async fn given_no_daemon_when_gathering_then_returns_no_process_found() {
    let manager = manager(FakeProbe::empty());
    let mut rx = manager.subscribe();

    let result = manager.gather_process_info().await;

    assert!(matches!(
        result,
        Err(ControlError::Discovery(DiscoveryError::NoProcessFound { .. }))
    ));
    wait_for_notification(&mut rx, NotificationKind::Error, |m| {
        m.starts_with("Failed to gather Tor process info")
    })
    .await;
    assert_eq!(manager.config().await.control_port, 9151);
}

#[tokio::test]
async fn given_fake_process_table_when_is_running_called_then_reflects_table() {
    let running = manager(FakeProbe::with_process(1, "/usr/bin/tor", "tor"));
    let stopped = manager(FakeProbe::empty());

    assert!(running.is_running().await.unwrap());
    assert!(!stopped.is_running().await.unwrap());
}
