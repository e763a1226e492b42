//! The orchestrator the front end talks to.
//!
//! [`ControlManager`] owns the control channel, the daemon process handle and
//! the current [`DaemonConfig`]. It composes the channel, the authenticator,
//! the supervisor and discovery, and republishes everything through one
//! [`Notifier`].
//!
//! # Serialization
//!
//! A single session lock guards the control channel. `connect`,
//! `send_command` (including its implicit connect and the full
//! request/response cycle) and `disconnect` each hold it for their whole
//! duration, so requests never interleave on the wire. Waiters are served in
//! arrival order.

mod state;

pub use state::ConnectionState;

use crate::config::{AuthMethod, DaemonConfig};
use crate::control::{ControlChannel, authenticate};
use crate::daemon::discovery::{DiscoveryResult, discover};
use crate::daemon::probe::{NativeProbe, SystemProbe};
use crate::daemon::supervisor::{LaunchOutcome, Launcher, ProcessSupervisor, SystemLauncher};
use crate::error::channel::ChannelError;
use crate::error::control::ControlError;
use crate::error::discovery::DiscoveryError;
use crate::error::render_chain;
use crate::error::supervisor::SupervisorError;
use crate::notify::{Notification, Notifier};
use crate::{CONTROL_HOST, TOR_PROCESS_NAME};

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::spawn_blocking;
use tokio::time::{sleep as TokioSleep, timeout};

#[derive(Default)]
struct Session {
    channel: Option<ControlChannel>,
}

/// Control Protocol Manager.
///
/// All methods take `&self`; share it behind an [`Arc`] to call it from
/// several tasks.
pub struct ControlManager<L: Launcher = SystemLauncher, P: SystemProbe = NativeProbe> {
    config: RwLock<DaemonConfig>,
    /// Cookie of the daemon we launched in a private data directory. Takes
    /// precedence over the configured cookie path while that daemon runs.
    launched_cookie: RwLock<Option<PathBuf>>,
    session: Mutex<Session>,
    supervisor: Mutex<ProcessSupervisor<L>>,
    probe: Arc<P>,
    notifier: Notifier,
    state_tx: watch::Sender<ConnectionState>,
}

impl ControlManager {
    /// Manager that launches real processes and inspects the real OS.
    pub fn new(config: DaemonConfig) -> Self {
        Self::with_components(config, SystemLauncher, NativeProbe, Notifier::new())
    }
}

impl<L: Launcher, P: SystemProbe> ControlManager<L, P> {
    pub fn with_components(config: DaemonConfig, launcher: L, probe: P, notifier: Notifier) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            config: RwLock::new(config),
            launched_cookie: RwLock::new(None),
            session: Mutex::new(Session::default()),
            supervisor: Mutex::new(ProcessSupervisor::new(launcher, notifier.clone())),
            probe: Arc::new(probe),
            notifier,
            state_tx,
        }
    }

    // ------------------------------------------------------------------
    // Notifications, state and configuration
    // ------------------------------------------------------------------

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub async fn config(&self) -> DaemonConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: DaemonConfig) {
        *self.config.write().await = config;
    }

    /// Mutate the configuration in place, e.g. to change only the port.
    pub async fn update_config<F>(&self, update: F)
    where
        F: FnOnce(&mut DaemonConfig),
    {
        update(&mut *self.config.write().await);
    }

    /// Cookie file of the daemon this manager launched, when it was started
    /// with cookie authentication in its own data directory.
    pub async fn launched_cookie_path(&self) -> Option<PathBuf> {
        self.launched_cookie.read().await.clone()
    }

    /// Configuration connections authenticate with: the stored one, with the
    /// launched daemon's cookie in place of the configured cookie path.
    pub async fn effective_config(&self) -> DaemonConfig {
        let mut config = self.config().await;
        if let Some(cookie_path) = self.launched_cookie.read().await.as_ref() {
            config.cookie_path = Some(cookie_path.clone());
        }
        config
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            trace!("Connection state {previous} -> {state}");
        }
    }

    fn report(&self, context: &str, err: &ControlError) {
        self.notifier
            .error(format!("{context}: {}", render_chain(err)));
    }

    // ------------------------------------------------------------------
    // Daemon process
    // ------------------------------------------------------------------

    /// Launch the daemon unless the one we launched is still running.
    ///
    /// When the daemon is launched with cookie authentication in its own data
    /// directory, connections use that cookie until the daemon is stopped.
    /// The configuration itself is left untouched, so a later launch gets a
    /// fresh directory again.
    pub async fn start_daemon(&self) -> Result<LaunchOutcome, ControlError> {
        let config = self.config().await;
        let outcome = self.supervisor.lock().await.start(&config).await;

        match outcome {
            Ok(outcome) => {
                if let LaunchOutcome::Launched { cookie_path, .. } = &outcome {
                    if let Some(cookie_path) = cookie_path {
                        debug!("Expecting auth cookie at {}", cookie_path.display());
                    }
                    *self.launched_cookie.write().await = cookie_path.clone();
                }
                Ok(outcome)
            }
            Err(e) => {
                let err = ControlError::from(e);
                self.report("Failed to launch Tor", &err);
                Err(err)
            }
        }
    }

    /// Stop the daemon this manager launched. Does nothing for a daemon
    /// started elsewhere.
    pub async fn stop_daemon(&self) -> Result<(), ControlError> {
        let result = self.supervisor.lock().await.stop().await;
        *self.launched_cookie.write().await = None;

        result.map_err(|e| {
            let err = ControlError::from(e);
            self.report("Failed to stop Tor", &err);
            err
        })
    }

    /// Whether the daemon launched by this manager is still alive.
    pub async fn is_daemon_alive(&self) -> bool {
        self.supervisor.lock().await.is_alive()
    }

    /// Whether any daemon process is running, launched by us or not.
    pub async fn is_running(&self) -> Result<bool, ControlError> {
        let probe = Arc::clone(&self.probe);

        let processes = spawn_blocking(move || probe.processes_named(TOR_PROCESS_NAME))
            .await
            .map_err(|e| DiscoveryError::Worker {
                message: format!("Process scan worker failed: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })
            .and_then(|result| result)
            .map_err(|e| {
                let err = ControlError::from(e);
                self.report("Failed to scan processes", &err);
                err
            })?;

        Ok(!processes.is_empty())
    }

    /// Discover a running daemon and adopt its control port and cookie file.
    ///
    /// The configured port is replaced only when a candidate port is
    /// confirmed by the listen table; the cookie path only when one is found.
    pub async fn gather_process_info(&self) -> Result<DiscoveryResult, ControlError> {
        let seed_port = self.config.read().await.control_port;

        let result = discover(Arc::clone(&self.probe), seed_port, self.notifier.clone())
            .await
            .map_err(|e| {
                let err = ControlError::from(e);
                self.report("Failed to gather Tor process info", &err);
                err
            })?;

        let mut config = self.config.write().await;
        if let Some(port) = result.confirmed_port {
            config.control_port = port;
        }
        if let Some(cookie_path) = &result.cookie_path {
            config.cookie_path = Some(cookie_path.clone());
        }

        Ok(result)
    }

    /// Poll the control port until it accepts TCP connections.
    ///
    /// Covers the gap between launching the daemon and the daemon binding
    /// its control port. Gives up after `startup_timeout`.
    pub async fn wait_until_listening(&self) -> Result<(), ControlError> {
        let config = self.config().await;
        let address = format!("{CONTROL_HOST}:{}", config.control_port);

        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(config.startup_timeout),
            ..Default::default()
        };

        debug!("Waiting for control port at {address}");

        loop {
            if let Ok(Ok(_)) = timeout(config.io_timeout, TcpStream::connect(&address)).await {
                self.notifier
                    .info(format!("Control port {} is accepting connections", config.control_port));
                return Ok(());
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    trace!("Control port not ready, retrying after {duration:?}");
                    TokioSleep(duration).await;
                }
                None => {
                    let err = ControlError::from(SupervisorError::Timeout {
                        message: format!(
                            "Control port {address} did not open within {:?}",
                            config.startup_timeout
                        ),
                        location: ErrorLocation::from(Location::caller()),
                    });
                    self.report("Tor did not become ready", &err);
                    return Err(err);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Control channel
    // ------------------------------------------------------------------

    /// Open and authenticate the control connection.
    ///
    /// Replaces any existing connection. Concurrent callers run one at a time.
    pub async fn connect(&self) -> Result<AuthMethod, ControlError> {
        let mut session = self.session.lock().await;

        self.connect_locked(&mut session).await.inspect_err(|err| {
            self.report("Failed to connect to Tor", err);
        })
    }

    async fn connect_locked(&self, session: &mut Session) -> Result<AuthMethod, ControlError> {
        if let Some(mut previous) = session.channel.take() {
            trace!("Closing previous control connection before reconnecting");
            let _ = previous.shutdown().await;
        }

        self.set_state(ConnectionState::Connecting);
        let config = self.effective_config().await;

        let mut channel = match ControlChannel::connect(
            CONTROL_HOST,
            config.control_port,
            config.io_timeout,
            self.notifier.clone(),
        )
        .await
        {
            Ok(channel) => channel,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(ControlError::Connection {
                    message: format!(
                        "Cannot open control connection to {CONTROL_HOST}:{}",
                        config.control_port
                    ),
                    location: ErrorLocation::from(Location::caller()),
                    source: Box::new(e),
                });
            }
        };

        match authenticate(&mut channel, &config, &self.notifier).await {
            Ok(method) => {
                session.channel = Some(channel);
                self.set_state(ConnectionState::Authenticated);
                Ok(method)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(ControlError::Connection {
                    message: format!("Authentication using {} method failed", e.method()),
                    location: ErrorLocation::from(Location::caller()),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Close the control connection. Best effort: close failures are
    /// reported as Error notifications, never returned.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;

        if let Some(mut channel) = session.channel.take()
            && let Err(e) = channel.shutdown().await
        {
            self.notifier.error(format!(
                "Error while closing control connection: {}",
                render_chain(&e)
            ));
        }

        self.set_state(ConnectionState::Disconnected);
        self.notifier.info("Control connection closed");
    }

    /// Send one command and return the raw reply.
    ///
    /// Connects (and authenticates) first when not connected. A channel
    /// failure drops the connection; the next command reconnects. So does a
    /// connection the daemon closed without replying.
    ///
    /// Errors name only the command keyword; arguments may hold secrets.
    pub async fn send_command(&self, command: &str) -> Result<String, ControlError> {
        let mut session = self.session.lock().await;

        if session.channel.is_none() || !self.state().is_authenticated() {
            debug!("Not connected, connecting before sending command");
            self.connect_locked(&mut session).await.inspect_err(|err| {
                self.report("Failed to connect to Tor", err);
            })?;
        }

        let result = match session.channel.as_mut() {
            Some(channel) => match channel.send(command).await {
                Ok(()) => match channel.read_reply().await {
                    Ok(reply) if reply.is_empty() => Err(ChannelError::Closed {
                        message: "Control connection closed by Tor".to_string(),
                        location: ErrorLocation::from(Location::caller()),
                    }),
                    other => other,
                },
                Err(e) => Err(e),
            },
            None => Err(ChannelError::Closed {
                message: "Control connection is not open".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        };

        result.map_err(|e| {
            session.channel = None;
            self.set_state(ConnectionState::Disconnected);

            let keyword = command.split_whitespace().next().unwrap_or_default();
            let err = ControlError::Command {
                message: format!("Command {keyword} failed"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            };
            self.report("Failed to execute command", &err);
            err
        })
    }
}
