// Unit tests for the authentication handshake
// These drive `authenticate` over an in-memory stream with a scripted daemon

use crate::config::{AuthMethod, DaemonConfig};
use crate::control::auth::{authenticate, cookie_request, password_request};
use crate::control::channel::ControlChannel;
use crate::error::auth::AuthError;
use crate::notify::{NotificationKind, Notifier};

use common::RedactedPassword;

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};
use tokio::task::JoinHandle;

/// Run a handshake against a scripted daemon that answers `reply` to the
/// first request line. Returns the handshake result and the request seen.
async fn handshake(
    config: &DaemonConfig,
    reply: &'static str,
) -> (Result<AuthMethod, AuthError>, String) {
    let (client, server) = duplex(4096);

    let daemon: JoinHandle<String> = tokio::spawn(async move {
        let mut server = BufReader::new(server);
        let mut request = String::new();
        server.read_line(&mut request).await.unwrap();
        server.get_mut().write_all(reply.as_bytes()).await.unwrap();
        request
    });

    let notifier = Notifier::new();
    let mut channel = ControlChannel::new(client, Duration::from_secs(2), notifier.clone());
    let result = authenticate(&mut channel, config, &notifier).await;

    (result, daemon.await.unwrap())
}

fn cookie_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file
}

/// **VALUE**: Password auth sends exactly `AUTHENTICATE "<password>"\n`.
///
/// **WHY THIS MATTERS**: The daemon compares the quoted string against its hashed
/// password. Any extra byte is an authentication failure.
///
/// **BUG THIS CATCHES**: Would catch missing quotes or a wrong terminator.
#[tokio::test]
async fn given_passwords_when_authenticate_called_then_sends_exact_quoted_request() {
    for password in ["secret", "with space", "p@ss:w0rd!", "x"] {
        // GIVEN: A config with a password and a daemon that accepts it
        let config =
            DaemonConfig::new("tor").with_password(Some(RedactedPassword::new(password)));

        // WHEN: Authenticating
        let (result, request) = handshake(&config, "250 OK\r\n").await;

        // THEN: The exact wire request was sent and password auth succeeded
        assert_eq!(request, format!("AUTHENTICATE \"{password}\"\n"));
        assert_eq!(result.unwrap(), AuthMethod::Password);
    }
}

/// **VALUE**: Success requires `250 OK` in the reply, nothing else.
///
/// **WHY THIS MATTERS**: A rejected handshake must never be reported as
/// authenticated, or every later command fails with a confusing error.
///
/// **BUG THIS CATCHES**: Would catch treating any `250` or any reply as success.
#[tokio::test]
async fn given_rejection_when_authenticate_called_then_returns_rejected_with_response() {
    // GIVEN: A daemon that rejects the password
    let config = DaemonConfig::new("tor").with_password(Some(RedactedPassword::new("wrong")));

    // WHEN: Authenticating
    let (result, _) = handshake(&config, "515 Authentication failed: Password did not match\r\n").await;

    // THEN: The error carries the method and the raw response
    let err = result.unwrap_err();
    assert_eq!(err.method(), AuthMethod::Password);
    assert_eq!(
        err.response(),
        Some("515 Authentication failed: Password did not match\r\n")
    );
}

/// **VALUE**: Cookie auth sends the file's bytes as uppercase hex without separators.
///
/// **WHY THIS MATTERS**: The daemon only accepts the exact 32-byte cookie encoded
/// in hex; lowercase or separated output is rejected.
///
/// **BUG THIS CATCHES**: Would catch lowercase hex or a `-`-separated encoding.
#[tokio::test]
async fn given_cookie_file_when_authenticate_called_then_sends_uppercase_hex() {
    // GIVEN: A cookie file with known bytes and no password configured
    let cookie = cookie_file(&[0x00, 0xab, 0x10, 0xff, 0x7e]);
    let config = DaemonConfig::new("tor").with_cookie_path(Some(cookie.path().to_path_buf()));

    // WHEN: Authenticating
    let (result, request) = handshake(&config, "250 OK\r\n").await;

    // THEN: The cookie is sent as uppercase hex
    assert_eq!(request, "AUTHENTICATE 00AB10FF7E\n");
    assert_eq!(result.unwrap(), AuthMethod::Cookie);
}

/// **VALUE**: Password wins over cookie when both are configured.
///
/// **WHY THIS MATTERS**: The methods are resolved by fixed priority, not by
/// which field was set last.
///
/// **BUG THIS CATCHES**: Would catch the priority order being swapped.
#[tokio::test]
async fn given_password_and_cookie_when_authenticate_called_then_password_is_used() {
    // GIVEN: Both a password and an existing cookie file
    let cookie = cookie_file(&[0x01]);
    let config = DaemonConfig::new("tor")
        .with_password(Some(RedactedPassword::new("pw")))
        .with_cookie_path(Some(cookie.path().to_path_buf()));

    // WHEN: Authenticating
    let (result, request) = handshake(&config, "250 OK\r\n").await;

    // THEN: Password authentication is used
    assert_eq!(request, "AUTHENTICATE \"pw\"\n");
    assert_eq!(result.unwrap(), AuthMethod::Password);
}

/// **VALUE**: A configured but missing cookie file falls back to the GETCONF probe.
///
/// **WHY THIS MATTERS**: A stale cookie path from settings must not make every
/// connect fail with a file error when the daemon needs no authentication.
///
/// **BUG THIS CATCHES**: Would catch the cookie method being chosen without the
/// existence check.
#[tokio::test]
async fn given_missing_cookie_file_when_authenticate_called_then_probes_with_getconf() {
    // GIVEN: A cookie path that does not exist
    let config = DaemonConfig::new("tor")
        .with_cookie_path(Some("/nonexistent/control_auth_cookie".into()));

    // WHEN: Authenticating against a daemon without authentication
    let (result, request) = handshake(&config, "250 OK\r\n").await;

    // THEN: GETCONF is sent and treated as implicit authentication
    assert_eq!(request, "GETCONF\n");
    assert_eq!(result.unwrap(), AuthMethod::None);
}

/// **VALUE**: Successful authentication emits an Info notification naming the method.
///
/// **WHY THIS MATTERS**: The collaborator shows which method actually worked.
///
/// **BUG THIS CATCHES**: Would catch the success notification being dropped.
#[tokio::test]
async fn given_accepting_daemon_when_authenticated_then_info_names_method() {
    // GIVEN: A notifier subscriber and a daemon that needs no authentication
    let (client, server) = duplex(256);
    tokio::spawn(async move {
        let mut server = BufReader::new(server);
        let mut line = String::new();
        server.read_line(&mut line).await.unwrap();
        server.get_mut().write_all(b"250 OK\r\n").await.unwrap();
    });
    let notifier = Notifier::new();
    let mut notifications = notifier.subscribe();
    let mut channel = ControlChannel::new(client, Duration::from_secs(2), notifier.clone());

    // WHEN: Authenticating
    authenticate(&mut channel, &DaemonConfig::new("tor"), &notifier)
        .await
        .unwrap();

    // THEN: After the read echo, an Info names the method
    let messages: Vec<_> = std::iter::from_fn(|| notifications.try_recv().ok()).collect();
    assert!(messages.iter().all(|n| n.kind == NotificationKind::Info));
    assert!(
        messages
            .iter()
            .any(|n| n.message == "Authenticated using none method"),
        "Got {messages:?}"
    );
}

#[test]
fn given_same_cookie_when_encoded_twice_then_requests_are_identical() {
    let cookie: Vec<u8> = (0u8..32).collect();
    assert_eq!(cookie_request(&cookie), cookie_request(&cookie));
    assert_eq!(
        cookie_request(&cookie),
        "AUTHENTICATE 000102030405060708090A0B0C0D0E0F101112131415161718191A1B1C1D1E1F"
    );
}

#[test]
fn given_password_when_request_built_then_password_is_quoted() {
    assert_eq!(password_request("abc"), "AUTHENTICATE \"abc\"");
}
