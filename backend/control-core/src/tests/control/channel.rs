// Unit tests for control channel framing
// Manager-level behavior over real sockets is in integration_tests/manager.rs

use crate::control::channel::{ControlChannel, ReplyLine, classify_reply_line};
use crate::error::channel::ChannelError;
use crate::notify::{NotificationKind, Notifier};

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

const TEST_TIMEOUT: Duration = Duration::from_secs(2);

fn channel_pair() -> (ControlChannel<DuplexStream>, DuplexStream) {
    let (client, server) = duplex(4096);
    (
        ControlChannel::new(client, TEST_TIMEOUT, Notifier::new()),
        server,
    )
}

/// **VALUE**: `read_response` stops at the first `\r\n` and leaves the rest buffered.
///
/// **WHY THIS MATTERS**: The best-effort read must return exactly one terminated
/// line. Swallowing the next line would desynchronize every later command.
///
/// **BUG THIS CATCHES**: Would catch a chunked read that returns whatever the
/// socket delivered in one go.
#[tokio::test]
async fn given_two_lines_when_read_response_called_then_returns_first_line_only() {
    // GIVEN: A daemon that sends two lines at once
    let (mut channel, mut server) = channel_pair();
    server
        .write_all(b"250 OK\r\n650 STATUS_GENERAL NOTICE\r\n")
        .await
        .unwrap();

    // WHEN: Reading twice
    let first = channel.read_response().await.unwrap();
    let second = channel.read_response().await.unwrap();

    // THEN: Each read returns exactly one line, terminator included
    assert_eq!(first, "250 OK\r\n");
    assert_eq!(second, "650 STATUS_GENERAL NOTICE\r\n");
}

/// **VALUE**: A bare `\n` is not the response terminator.
///
/// **WHY THIS MATTERS**: The protocol terminates lines with CRLF. Stopping on a
/// bare LF would split a reply in two.
///
/// **BUG THIS CATCHES**: Would catch `read_until(b'\n')` being returned without
/// checking for the preceding `\r`.
#[tokio::test]
async fn given_bare_newline_when_read_response_called_then_keeps_reading_until_crlf() {
    // GIVEN: Text containing a bare LF before the CRLF
    let (mut channel, mut server) = channel_pair();
    server.write_all(b"first\nsecond\r\n").await.unwrap();

    // WHEN: Reading a response
    let response = channel.read_response().await.unwrap();

    // THEN: Both parts are returned together
    assert_eq!(response, "first\nsecond\r\n");
}

/// **VALUE**: End-of-stream returns whatever accumulated instead of blocking.
///
/// **WHY THIS MATTERS**: The daemon closes the socket after a failed AUTHENTICATE.
/// The caller must get the partial text for diagnostics, not hang.
///
/// **BUG THIS CATCHES**: Would catch a loop that ignores zero-byte reads.
#[tokio::test]
async fn given_stream_closed_without_terminator_when_read_response_called_then_returns_partial() {
    // GIVEN: A daemon that writes a partial line and closes
    let (mut channel, mut server) = channel_pair();
    server.write_all(b"515 Authentication failed").await.unwrap();
    drop(server);

    // WHEN: Reading a response
    let response = channel.read_response().await.unwrap();

    // THEN: The partial text is returned
    assert_eq!(response, "515 Authentication failed");
}

/// **VALUE**: `send` appends exactly one `\n` terminator.
///
/// **WHY THIS MATTERS**: The wire format for every request is `<text>\n`.
///
/// **BUG THIS CATCHES**: Would catch a missing terminator (daemon waits forever)
/// or a doubled one (daemon sees an extra empty command).
#[tokio::test]
async fn given_command_when_send_called_then_writes_command_and_newline() {
    // GIVEN: A channel
    let (mut channel, mut server) = channel_pair();

    // WHEN: Sending a command and closing the write half
    channel.send("GETINFO version").await.unwrap();
    channel.shutdown().await.unwrap();

    // THEN: The peer receives the command followed by a single newline
    let mut received = String::new();
    server.read_to_string(&mut received).await.unwrap();
    assert_eq!(received, "GETINFO version\n");
}

/// **VALUE**: `read_reply` assembles mid lines up to the end line.
///
/// **WHY THIS MATTERS**: `GETINFO` with several keys answers with `250-` lines
/// followed by `250 OK`. The caller needs the whole reply in one value.
///
/// **BUG THIS CATCHES**: Would catch `read_reply` stopping after the first line.
#[tokio::test]
async fn given_multi_line_reply_when_read_reply_called_then_returns_whole_reply() {
    // GIVEN: A multi-line reply followed by an unrelated async event
    let (mut channel, mut server) = channel_pair();
    server
        .write_all(b"250-version=0.4.8.12\r\n250-config-file=/etc/tor/torrc\r\n250 OK\r\n650 BW 1 2\r\n")
        .await
        .unwrap();

    // WHEN: Reading one reply
    let reply = channel.read_reply().await.unwrap();

    // THEN: All lines up to the end line are returned, the event is not
    assert_eq!(
        reply,
        "250-version=0.4.8.12\r\n250-config-file=/etc/tor/torrc\r\n250 OK\r\n"
    );
}

/// **VALUE**: `read_reply` consumes a `+` data block through its `.` terminator.
///
/// **WHY THIS MATTERS**: Data blocks may contain lines that look like end lines
/// (e.g. `250 something`). Treating them as the end truncates the reply.
///
/// **BUG THIS CATCHES**: Would catch data-block lines being classified as status lines.
#[tokio::test]
async fn given_data_block_when_read_reply_called_then_reads_through_terminator() {
    // GIVEN: A data reply whose body contains a status-like line
    let (mut channel, mut server) = channel_pair();
    let wire = "250+config-text=\r\nControlPort 9151\r\n250 looks like an end line\r\n.\r\n250 OK\r\n";
    server.write_all(wire.as_bytes()).await.unwrap();

    // WHEN: Reading one reply
    let reply = channel.read_reply().await.unwrap();

    // THEN: The full reply including the final end line is returned
    assert_eq!(reply, wire);
}

/// **VALUE**: A silent peer produces a timeout instead of blocking forever.
///
/// **WHY THIS MATTERS**: A stalled daemon must not freeze the manager.
///
/// **BUG THIS CATCHES**: Would catch reads issued without the I/O timeout.
#[tokio::test]
async fn given_silent_peer_when_read_response_called_then_times_out() {
    // GIVEN: A channel with a short timeout and a peer that never answers
    let (client, _server) = duplex(64);
    let mut channel = ControlChannel::new(client, Duration::from_millis(50), Notifier::new());

    // WHEN: Reading a response
    let result = channel.read_response().await;

    // THEN: A timeout error is returned
    assert!(
        matches!(result, Err(ChannelError::Timeout { .. })),
        "Expected timeout, got {result:?}"
    );
}

/// **VALUE**: Every read is echoed as an Info notification with its byte count.
///
/// **WHY THIS MATTERS**: The collaborator's diagnostic log relies on seeing raw
/// daemon traffic.
///
/// **BUG THIS CATCHES**: Would catch the observability side effect being dropped.
#[tokio::test]
async fn given_subscriber_when_response_read_then_info_notification_reports_bytes() {
    // GIVEN: A channel whose notifier has a subscriber
    let notifier = Notifier::new();
    let mut notifications = notifier.subscribe();
    let (client, mut server) = duplex(64);
    let mut channel = ControlChannel::new(client, TEST_TIMEOUT, notifier);
    server.write_all(b"250 OK\r\n").await.unwrap();

    // WHEN: Reading a response
    channel.read_response().await.unwrap();

    // THEN: An Info notification names the byte count and trimmed text
    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.kind, NotificationKind::Info);
    assert_eq!(notification.message, "Read 8 bytes: 250 OK");
}

#[test]
fn given_reply_lines_when_classified_then_separator_decides_kind() {
    assert_eq!(classify_reply_line("250 OK"), ReplyLine::End);
    assert_eq!(classify_reply_line("250"), ReplyLine::End);
    assert_eq!(classify_reply_line("250-version=1"), ReplyLine::Mid);
    assert_eq!(classify_reply_line("250+config-text="), ReplyLine::Data);
    assert_eq!(classify_reply_line("hello"), ReplyLine::Malformed);
    assert_eq!(classify_reply_line("25"), ReplyLine::Malformed);
    assert_eq!(classify_reply_line("250x"), ReplyLine::Malformed);
}
