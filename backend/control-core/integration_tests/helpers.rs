//! Test helpers for control-core integration tests.
//!
//! This module provides:
//! - [`FakeProbe`]: a scripted process table and listen table
//! - [`ScriptLauncher`]: records every launch and runs a shell script instead
//! - [`MockControlServer`]: a loopback control port with a scripted responder
//! - Notification helpers

use control_core::daemon::{ProcessSnapshot, SystemProbe};
use control_core::error::DiscoveryError;
use control_core::daemon::Launcher;
use control_core::{Notification, NotificationKind, TOR_PROCESS_NAME};

use std::collections::BTreeSet;
use std::io::Result as IoResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child as TokioChild, Command as TokioCommand};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

pub const SUCCESS_REPLY: &str = "250 OK\r\n";
pub const BAD_PASSWORD_REPLY: &str =
    "515 Authentication failed: Password did not match HashedControlPassword value from configuration\r\n";

// ============================================================================
// FakeProbe
// ============================================================================

/// [`SystemProbe`] with a fixed process table and listen table.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    pub processes: Vec<ProcessSnapshot>,
    pub listening: BTreeSet<u16>,
}

impl FakeProbe {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_process(pid: u32, executable: &str, command_line: &str) -> Self {
        Self {
            processes: vec![ProcessSnapshot {
                pid,
                executable: Some(executable.into()),
                command_line: command_line.to_string(),
            }],
            listening: BTreeSet::new(),
        }
    }

    pub fn listening_on(mut self, ports: &[u16]) -> Self {
        self.listening.extend(ports.iter().copied());
        self
    }
}

impl SystemProbe for FakeProbe {
    fn processes_named(&self, name: &str) -> Result<Vec<ProcessSnapshot>, DiscoveryError> {
        if name == TOR_PROCESS_NAME {
            Ok(self.processes.clone())
        } else {
            Ok(Vec::new())
        }
    }

    fn listening_ports(&self, pid: u32) -> Result<BTreeSet<u16>, DiscoveryError> {
        if self.processes.iter().any(|p| p.pid == pid) {
            Ok(self.listening.clone())
        } else {
            Ok(BTreeSet::new())
        }
    }
}

// ============================================================================
// ScriptLauncher
// ============================================================================

/// [`Launcher`] that records the arguments of every launch and runs a shell
/// script in place of the real binary.
///
/// `--hash-password` invocations run `hash_script`; everything else runs
/// `daemon_script`.
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    daemon_script: String,
    hash_script: String,
    launches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptLauncher {
    pub fn new(daemon_script: &str) -> Self {
        Self {
            daemon_script: daemon_script.to_string(),
            hash_script: "echo '16:ABCDEF0123456789'".to_string(),
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A daemon that prints a bootstrap line and then idles.
    pub fn long_running() -> Self {
        Self::new("echo 'Bootstrapped 0% (starting): Starting'; exec sleep 30")
    }

    pub fn with_hash_script(mut self, hash_script: &str) -> Self {
        self.hash_script = hash_script.to_string();
        self
    }

    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches.lock().unwrap().clone()
    }

    /// Launches that started a daemon, excluding password hashing.
    pub fn daemon_launches(&self) -> usize {
        self.launches()
            .iter()
            .filter(|args| args.first().map(String::as_str) != Some("--hash-password"))
            .count()
    }
}

impl Launcher for ScriptLauncher {
    fn spawn(&self, command: &mut TokioCommand) -> IoResult<TokioChild> {
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let script = if args.first().map(String::as_str) == Some("--hash-password") {
            &self.hash_script
        } else {
            &self.daemon_script
        };

        self.launches.lock().unwrap().push(args);

        TokioCommand::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

// ============================================================================
// MockControlServer
// ============================================================================

type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct ServerStats {
    connections: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    received: Mutex<Vec<String>>,
}

/// Loopback control port that answers each request line with `responder`.
///
/// Tracks accepted connections, received lines and the highest number of
/// requests being answered at the same time across all connections.
pub struct MockControlServer {
    pub port: u16,
    stats: Arc<ServerStats>,
}

impl MockControlServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::start_with_delay(responder, Duration::ZERO).await
    }

    /// Like [`start`](Self::start) but holds every reply for `delay`.
    pub async fn start_with_delay<F>(responder: F, delay: Duration) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::spawn(Arc::new(move |line: &str| Some(responder(line))), delay).await
    }

    /// Server whose responder may return `None` to close the connection
    /// without replying.
    pub async fn start_closing<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::spawn(Arc::new(responder), Duration::ZERO).await
    }

    async fn spawn(responder: Responder, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock control port");
        let port = listener.local_addr().unwrap().port();
        let stats = Arc::new(ServerStats::default());

        let server_stats = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server_stats.connections.fetch_add(1, Ordering::SeqCst);
                let stats = Arc::clone(&server_stats);
                let responder = Arc::clone(&responder);

                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut lines = BufReader::new(reader).lines();

                    while let Ok(Some(line)) = lines.next_line().await {
                        stats.received.lock().unwrap().push(line.clone());

                        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

                        if !delay.is_zero() {
                            sleep(delay).await;
                        }
                        let Some(reply) = responder(&line) else {
                            stats.in_flight.fetch_sub(1, Ordering::SeqCst);
                            break;
                        };
                        let written = writer.write_all(reply.as_bytes()).await;

                        stats.in_flight.fetch_sub(1, Ordering::SeqCst);
                        if written.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self { port, stats }
    }

    /// Server that accepts every request.
    pub async fn accepting() -> Self {
        Self::start(|_| SUCCESS_REPLY.to_string()).await
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.stats.received.lock().unwrap().clone()
    }
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Notifications
// ============================================================================

/// Wait for the first notification of `kind` whose message satisfies `matches`.
pub async fn wait_for_notification<F>(
    rx: &mut broadcast::Receiver<Notification>,
    kind: NotificationKind,
    matches: F,
) -> Notification
where
    F: Fn(&str) -> bool,
{
    timeout(NOTIFICATION_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(n) if n.kind == kind && matches(&n.message) => return n,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("Notification stream closed")
                }
            }
        }
    })
    .await
    .expect("Timed out waiting for notification")
}

/// Everything already queued on `rx`.
pub fn drain_notifications(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut drained = Vec::new();
    while let Ok(n) = rx.try_recv() {
        drained.push(n);
    }
    drained
}
