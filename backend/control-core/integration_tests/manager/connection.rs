use crate::helpers::{
    BAD_PASSWORD_REPLY, FakeProbe, MockControlServer, SUCCESS_REPLY, ScriptLauncher, closed_port,
    drain_notifications, wait_for_notification,
};

use control_core::error::{AuthError, ChannelError, ControlError};
use control_core::{AuthMethod, ConnectionState, ControlManager, DaemonConfig, NotificationKind, Notifier};

use common::RedactedPassword;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tempfile::NamedTempFile;

fn manager(config: DaemonConfig) -> ControlManager<ScriptLauncher, FakeProbe> {
    ControlManager::with_components(
        config,
        ScriptLauncher::long_running(),
        FakeProbe::empty(),
        Notifier::new(),
    )
}

fn password_config(port: u16, password: &str) -> DaemonConfig {
    DaemonConfig::new("tor")
        .with_control_port(port)
        .with_password(Some(RedactedPassword::new(password)))
}

// ============================================================================
// connect()
// ============================================================================

/// **VALUE**: A password handshake sends the quoted password and ends authenticated.
///
/// **WHY THIS MATTERS**: Password auth is the method the manager itself launches
/// the daemon with; if the wire format is wrong nothing works.
///
/// **BUG THIS CATCHES**: Would catch the password being hashed or hex-encoded
/// instead of quoted, or the state not reaching Authenticated.
#[tokio::test]
async fn given_password_when_connect_called_then_authenticates_with_quoted_password() {
    // GIVEN: A control port that accepts anything
    let server = MockControlServer::accepting().await;
    let manager = manager(password_config(server.port, "hunter2"));
    let mut rx = manager.subscribe();

    // WHEN: Connecting
    let method = manager.connect().await.expect("connect should succeed");

    // THEN: Password method over the wire, authenticated state
    assert_eq!(method, AuthMethod::Password);
    assert_eq!(server.received(), vec![r#"AUTHENTICATE "hunter2""#.to_string()]);
    assert_eq!(manager.state(), ConnectionState::Authenticated);
    wait_for_notification(&mut rx, NotificationKind::Info, |m| {
        m == "Authenticated using password method"
    })
    .await;
}

/// **VALUE**: Cookie auth sends the cookie bytes as uppercase hex.
///
/// **WHY THIS MATTERS**: Browser bundles use cookie auth; the daemon compares
/// the hex against the file it wrote.
///
/// **BUG THIS CATCHES**: Would catch lowercase hex or reading the cookie as text.
#[tokio::test]
async fn given_cookie_file_when_connect_called_then_sends_uppercase_hex() {
    // GIVEN: A cookie file and no password
    let server = MockControlServer::accepting().await;
    let mut cookie = NamedTempFile::new().unwrap();
    cookie.write_all(&[0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap();
    let config = DaemonConfig::new("tor")
        .with_control_port(server.port)
        .with_cookie_path(Some(cookie.path().to_path_buf()));
    let manager = manager(config);

    // WHEN: Connecting
    let method = manager.connect().await.expect("connect should succeed");

    // THEN: Cookie method with uppercase hex
    assert_eq!(method, AuthMethod::Cookie);
    assert_eq!(server.received(), vec!["AUTHENTICATE DEADBEEF01".to_string()]);
}

#[tokio::test]
async fn given_no_credentials_when_connect_called_then_probes_without_authenticating() {
    let server = MockControlServer::accepting().await;
    let manager = manager(DaemonConfig::new("tor").with_control_port(server.port));

    let method = manager.connect().await.expect("connect should succeed");

    assert_eq!(method, AuthMethod::None);
    assert_eq!(server.received(), vec!["GETCONF".to_string()]);
    assert!(manager.state().is_authenticated());
}

/// **VALUE**: A rejected password surfaces as a connection error carrying the
/// daemon's reply and an Error notification.
///
/// **WHY THIS MATTERS**: "Wrong password" is the most common user mistake; the
/// user has to see the daemon's own explanation.
///
/// **BUG THIS CATCHES**: Would catch a non-"250 OK" reply being treated as success,
/// or the reply text being lost on the way to the caller.
#[tokio::test]
async fn given_wrong_password_when_connect_called_then_returns_rejected_auth_error() {
    // GIVEN: A daemon that rejects every password
    let server = MockControlServer::start(|_| BAD_PASSWORD_REPLY.to_string()).await;
    let manager = manager(password_config(server.port, "wrong"));
    let mut rx = manager.subscribe();

    // WHEN: Connecting
    let err = manager.connect().await.expect_err("connect should fail");

    // THEN: Rejected with the password method and the daemon's reply
    match err.auth_error() {
        Some(AuthError::Rejected {
            method, response, ..
        }) => {
            assert_eq!(*method, AuthMethod::Password);
            assert!(response.starts_with("515 Authentication failed"));
        }
        other => panic!("Expected Rejected auth error, got {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let notification = wait_for_notification(&mut rx, NotificationKind::Error, |m| {
        m.starts_with("Failed to connect to Tor")
    })
    .await;
    assert!(notification.message.contains("Authentication using password method failed"));
    assert!(notification.message.contains("515 Authentication failed"));
}

#[tokio::test]
async fn given_nothing_listening_when_connect_called_then_returns_connect_error() {
    // GIVEN: A closed port
    let port = closed_port().await;
    let manager = manager(DaemonConfig::new("tor").with_control_port(port));

    // WHEN: Connecting
    let err = manager.connect().await.expect_err("connect should fail");

    // THEN: Connection error caused by the channel, not by authentication
    match &err {
        ControlError::Connection { source, .. } => {
            assert!(matches!(
                source.downcast_ref::<ChannelError>(),
                Some(ChannelError::Connect { .. })
            ));
        }
        other => panic!("Expected Connection error, got {other:?}"),
    }
    assert!(err.auth_error().is_none());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

/// **VALUE**: Concurrent connects open channels strictly one after another.
///
/// **WHY THIS MATTERS**: The control protocol is strictly request/response;
/// two handshakes interleaved on the wire corrupt both.
///
/// **BUG THIS CATCHES**: Would catch the session lock being dropped before the
/// handshake reply is read, letting two connects overlap.
#[tokio::test]
async fn given_ten_concurrent_connects_when_awaited_then_channels_open_sequentially() {
    // GIVEN: A slow daemon so overlapping handshakes would be observable
    let server = MockControlServer::start_with_delay(
        |_| SUCCESS_REPLY.to_string(),
        Duration::from_millis(20),
    )
    .await;
    let manager = Arc::new(manager(password_config(server.port, "pw")));

    // WHEN: Firing ten connects at once
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connect().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().expect("every connect should succeed");
    }

    // THEN: Ten channel opens, never more than one handshake at a time
    assert_eq!(server.connections(), 10);
    assert_eq!(server.max_in_flight(), 1);
    assert_eq!(manager.state(), ConnectionState::Authenticated);
}

// ============================================================================
// send_command() / disconnect()
// ============================================================================

/// **VALUE**: The first command connects implicitly; later commands reuse the channel.
///
/// **WHY THIS MATTERS**: Callers should not need to call `connect()` first, but
/// reconnecting for every command would re-authenticate every time.
///
/// **BUG THIS CATCHES**: Would catch auto-connect running on every call, or the
/// command being sent before authentication completes.
#[tokio::test]
async fn given_no_connection_when_send_command_called_then_connects_once_and_reuses() {
    // GIVEN: A daemon answering GETINFO with a multi-line reply
    let server = MockControlServer::start(|line| {
        if line.starts_with("GETINFO version") {
            "250-version=0.4.8.12\r\n250 OK\r\n".to_string()
        } else {
            SUCCESS_REPLY.to_string()
        }
    })
    .await;
    let manager = manager(password_config(server.port, "pw"));

    // WHEN: Sending two commands without connecting first
    let first = manager.send_command("GETINFO version").await.unwrap();
    let second = manager.send_command("GETINFO version").await.unwrap();

    // THEN: One connection, handshake first, complete replies returned
    assert_eq!(server.connections(), 1);
    assert_eq!(
        server.received(),
        vec![
            r#"AUTHENTICATE "pw""#.to_string(),
            "GETINFO version".to_string(),
            "GETINFO version".to_string(),
        ]
    );
    assert_eq!(first, "250-version=0.4.8.12\r\n250 OK\r\n");
    assert_eq!(second, first);
}

#[tokio::test]
async fn given_rejected_auth_when_send_command_called_then_command_is_never_sent() {
    let server = MockControlServer::start(|_| BAD_PASSWORD_REPLY.to_string()).await;
    let manager = manager(password_config(server.port, "wrong"));

    let result = manager.send_command("SIGNAL NEWNYM").await;

    assert!(matches!(result, Err(ControlError::Connection { .. })));
    assert_eq!(server.received(), vec![r#"AUTHENTICATE "wrong""#.to_string()]);
}

/// **VALUE**: A daemon that closes the connection instead of replying yields an error.
///
/// **WHY THIS MATTERS**: An empty reply is indistinguishable from success for a
/// caller that only checks `Ok`, and the dead channel would be kept for the next
/// command.
///
/// **BUG THIS CATCHES**: Would catch end-of-stream being returned as `Ok("")`
/// with the manager still claiming to be authenticated.
#[tokio::test]
async fn given_daemon_closes_connection_when_send_command_called_then_errors_and_reconnects() {
    // GIVEN: A daemon that hangs up on the first GETINFO only
    let hung_up = Arc::new(AtomicBool::new(false));
    let server_hung_up = Arc::clone(&hung_up);
    let server = MockControlServer::start_closing(move |line| {
        if line.starts_with("GETINFO") && !server_hung_up.swap(true, Ordering::SeqCst) {
            None
        } else if line.starts_with("GETINFO") {
            Some("250-version=0.4.8.12\r\n250 OK\r\n".to_string())
        } else {
            Some(SUCCESS_REPLY.to_string())
        }
    })
    .await;
    let manager = manager(password_config(server.port, "pw"));

    // WHEN: Sending a command the daemon never answers
    let result = manager.send_command("GETINFO version").await;

    // THEN: A closed-channel error and a dropped connection
    assert!(matches!(
        result,
        Err(ControlError::Command {
            source: ChannelError::Closed { .. },
            ..
        })
    ));
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // AND: The next command reconnects and gets a real reply
    let reply = manager.send_command("GETINFO version").await.unwrap();
    assert_eq!(reply, "250-version=0.4.8.12\r\n250 OK\r\n");
    assert_eq!(server.connections(), 2);
}

/// **VALUE**: A failed command is reported by its keyword only.
///
/// **WHY THIS MATTERS**: Commands such as `AUTHENTICATE` carry secrets, and the
/// error text ends up on the notification stream and in the log file.
///
/// **BUG THIS CATCHES**: Would catch the full command line, arguments included,
/// being formatted into the error message.
#[tokio::test]
async fn given_failing_command_with_secret_when_send_command_called_then_error_omits_arguments() {
    // GIVEN: A daemon without authentication that hangs up on AUTHENTICATE
    let server = MockControlServer::start_closing(|line| {
        if line.starts_with("AUTHENTICATE") {
            None
        } else {
            Some(SUCCESS_REPLY.to_string())
        }
    })
    .await;
    let manager = manager(DaemonConfig::new("tor").with_control_port(server.port));
    let mut rx = manager.subscribe();

    // WHEN: Sending a command whose argument is a secret
    let err = manager
        .send_command(r#"AUTHENTICATE "hunter2""#)
        .await
        .unwrap_err();

    // THEN: Neither the error nor the notification contains the secret
    assert!(!err.to_string().contains("hunter2"));
    let notification = wait_for_notification(&mut rx, NotificationKind::Error, |m| {
        m.starts_with("Failed to execute command")
    })
    .await;
    assert!(notification.message.contains("AUTHENTICATE"));
    assert!(!notification.message.contains("hunter2"));
}

/// **VALUE**: After an explicit disconnect the next command opens a new channel.
///
/// **WHY THIS MATTERS**: The front end disconnects when the user changes
/// settings; the next command must pick up a fresh, authenticated connection.
///
/// **BUG THIS CATCHES**: Would catch a stale channel being reused after disconnect.
#[tokio::test]
async fn given_disconnect_when_next_command_sent_then_reconnects() {
    // GIVEN: A connected manager
    let server = MockControlServer::accepting().await;
    let manager = manager(password_config(server.port, "pw"));
    manager.connect().await.unwrap();
    let mut rx = manager.subscribe();

    // WHEN: Disconnecting and sending a command
    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    manager.send_command("GETINFO version").await.unwrap();

    // THEN: A second connection with a second handshake
    assert_eq!(server.connections(), 2);
    assert_eq!(
        server
            .received()
            .iter()
            .filter(|l| l.starts_with("AUTHENTICATE"))
            .count(),
        2
    );
    let infos: Vec<String> = drain_notifications(&mut rx)
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Info)
        .map(|n| n.message)
        .collect();
    assert!(infos.iter().any(|m| m == "Control connection closed"));
}

#[tokio::test]
async fn given_never_connected_when_disconnect_called_then_is_harmless() {
    let manager = manager(DaemonConfig::new("tor"));

    manager.disconnect().await;
    manager.disconnect().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

/// **VALUE**: State changes are observable through the watch channel.
///
/// **WHY THIS MATTERS**: The front end renders connection state without polling.
///
/// **BUG THIS CATCHES**: Would catch `state()` being updated without the watch
/// receivers seeing the change.
#[tokio::test]
async fn given_state_watcher_when_connect_and_disconnect_then_changes_are_published() {
    let server = MockControlServer::accepting().await;
    let manager = manager(password_config(server.port, "pw"));
    let mut state_rx = manager.watch_state();

    manager.connect().await.unwrap();
    assert!(state_rx.has_changed().unwrap());
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Authenticated);

    manager.disconnect().await;
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Disconnected);
}

// ============================================================================
// wait_until_listening()
// ============================================================================

#[tokio::test]
async fn given_open_port_when_wait_until_listening_called_then_returns_ok() {
    let server = MockControlServer::accepting().await;
    let manager = manager(DaemonConfig::new("tor").with_control_port(server.port));

    manager.wait_until_listening().await.expect("port is open");
}

/// **VALUE**: Waiting for a port that never opens gives up after the startup timeout.
///
/// **WHY THIS MATTERS**: A daemon that fails to bootstrap must not hang the UI.
///
/// **BUG THIS CATCHES**: Would catch an unbounded retry loop.
#[tokio::test]
async fn given_closed_port_when_wait_until_listening_called_then_times_out() {
    // GIVEN: Nothing listening and a short startup timeout
    let port = closed_port().await;
    let mut config = DaemonConfig::new("tor").with_control_port(port);
    config.startup_timeout = Duration::from_millis(200);
    let manager = manager(config);

    // WHEN: Waiting
    let err = manager
        .wait_until_listening()
        .await
        .expect_err("should time out");

    // THEN: A supervisor timeout
    assert!(err.to_string().starts_with("Timeout Error"));
}
