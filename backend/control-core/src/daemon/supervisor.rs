use crate::COOKIE_FILE_NAME;
use crate::config::DaemonConfig;
use crate::error::supervisor::SupervisorError;
use crate::notify::Notifier;

use common::{ErrorLocation, RedactedPassword};

use std::ffi::OsString;
use std::io::Error as IoError;
use std::panic::Location;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use log::{debug, trace};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child as TokioChild;
use tokio::process::Command as TokioCommand;
use tokio::spawn as TokioSpawn;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const CONTROL_PORT_FLAG: &str = "--ControlPort";
const HASHED_PASSWORD_FLAG: &str = "--HashedControlPassword";
const HASH_PASSWORD_FLAG: &str = "--hash-password";
const DATA_DIRECTORY_FLAG: &str = "--DataDirectory";
const COOKIE_AUTH_FLAG: &str = "--CookieAuthentication";
const COOKIE_AUTH_ENABLED: &str = "1";
const DATA_DIRECTORY_PREFIX: &str = "tor-manager-";

/// Seam for process creation so launches can be observed or faked.
pub trait Launcher: Send + Sync + 'static {
    fn spawn(&self, command: &mut TokioCommand) -> std::io::Result<TokioChild>;
}

/// Spawns commands as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn spawn(&self, command: &mut TokioCommand) -> std::io::Result<TokioChild> {
        command.spawn()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new daemon was spawned.
    Launched {
        pid: Option<u32>,
        /// Where the daemon will write its cookie when we asked for cookie
        /// authentication in a private data directory. The directory lives
        /// until the daemon is stopped.
        cookie_path: Option<PathBuf>,
    },
    /// The daemon we launched earlier is still alive; nothing was spawned.
    AlreadyRunning { pid: Option<u32> },
}

/// Authentication flags for a fresh launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LaunchAuth {
    HashedPassword(String),
    CookieInDataDirectory(PathBuf),
    DaemonDefault,
}

impl LaunchAuth {
    pub(crate) fn arguments(&self) -> Vec<OsString> {
        match self {
            LaunchAuth::HashedPassword(hash) => {
                vec![HASHED_PASSWORD_FLAG.into(), hash.into()]
            }
            LaunchAuth::CookieInDataDirectory(dir) => vec![
                DATA_DIRECTORY_FLAG.into(),
                dir.into(),
                COOKIE_AUTH_FLAG.into(),
                COOKIE_AUTH_ENABLED.into(),
            ],
            LaunchAuth::DaemonDefault => Vec::new(),
        }
    }
}

pub(crate) fn build_launch_command(config: &DaemonConfig, auth: &LaunchAuth) -> TokioCommand {
    let mut cmd = TokioCommand::new(&config.executable);
    cmd.arg(CONTROL_PORT_FLAG)
        .arg(config.control_port.to_string())
        .args(auth.arguments())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

pub(crate) fn build_hash_command(config: &DaemonConfig, password: &RedactedPassword) -> TokioCommand {
    let mut cmd = TokioCommand::new(&config.executable);
    cmd.arg(HASH_PASSWORD_FLAG)
        .arg(password.expose())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// The hash is the last non-empty line the daemon prints.
pub(crate) fn parse_hashed_password(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

fn forward_lines<R>(reader: R, notifier: Notifier, as_error: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    TokioSpawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if as_error {
                notifier.error(line);
            } else {
                notifier.info(line);
            }
        }
    });
}

/// Owns the child until it exits or a kill is requested.
///
/// Dropping the kill sender (supervisor teardown) also kills the child.
async fn watch_daemon(
    mut child: TokioChild,
    kill_rx: oneshot::Receiver<()>,
    notifier: Notifier,
) -> Result<ExitStatus, IoError> {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };

    match exited {
        Some(status) => {
            let status = status?;
            notifier.info(format!("Tor process exited ({status})"));
            Ok(status)
        }
        None => {
            child.kill().await?;
            child.wait().await
        }
    }
}

fn create_data_directory() -> Result<TempDir, SupervisorError> {
    tempfile::Builder::new()
        .prefix(DATA_DIRECTORY_PREFIX)
        .tempdir()
        .map_err(|e| SupervisorError::Launch {
            message: format!("Failed to create a data directory: {e}"),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })
}

struct DaemonHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<Result<ExitStatus, IoError>>,
    /// Removed when the handle is dropped, after the child is gone.
    data_dir: Option<TempDir>,
}

impl DaemonHandle {
    fn is_alive(&self) -> bool {
        !self.watcher.is_finished()
    }
}

/// Launches the daemon as a child process and stops it on demand.
///
/// Only tracks the process it launched itself; a daemon started elsewhere is
/// invisible here (see [`discovery`](crate::daemon::discovery)).
pub struct ProcessSupervisor<L: Launcher = SystemLauncher> {
    launcher: L,
    handle: Option<DaemonHandle>,
    notifier: Notifier,
}

impl<L: Launcher> ProcessSupervisor<L> {
    pub fn new(launcher: L, notifier: Notifier) -> Self {
        Self {
            launcher,
            handle: None,
            notifier,
        }
    }

    /// Whether the daemon we launched is still running.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(DaemonHandle::is_alive)
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().filter(|h| h.is_alive()).and_then(|h| h.pid)
    }

    /// Private data directory of the daemon we launched, if it has one.
    pub fn data_directory(&self) -> Option<PathBuf> {
        self.handle
            .as_ref()
            .and_then(|h| h.data_dir.as_ref())
            .map(|dir| dir.path().to_path_buf())
    }

    /// Launch the daemon with `--ControlPort <port>` and authentication flags.
    ///
    /// Authentication flags, in priority order:
    /// - password set: `--HashedControlPassword <hash>` (hash from `--hash-password`)
    /// - no cookie path: cookie authentication in a fresh private data directory
    /// - cookie path known: nothing, the daemon's defaults apply
    ///
    /// stdout lines become Info notifications, stderr lines Error notifications.
    ///
    /// # Errors
    ///
    /// * [`SupervisorError::ExecutableNotFound`] - `config.executable` is not a file
    /// * [`SupervisorError::Launch`] - The process could not be spawned
    /// * [`SupervisorError::PasswordHash`] / [`SupervisorError::Timeout`] - Hashing failed
    pub async fn start(&mut self, config: &DaemonConfig) -> Result<LaunchOutcome, SupervisorError> {
        if self.is_alive() {
            let pid = self.pid();
            self.notifier.info(format!(
                "Tor is already running (PID {})",
                pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
            ));
            return Ok(LaunchOutcome::AlreadyRunning { pid });
        }

        if !config.executable.is_file() {
            return Err(SupervisorError::ExecutableNotFound {
                path: config.executable.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let mut data_dir = None;
        let auth = match (&config.control_password, &config.cookie_path) {
            (Some(password), _) => LaunchAuth::HashedPassword(self.hash_password(config, password).await?),
            (None, None) => {
                let dir = create_data_directory()?;
                let auth = LaunchAuth::CookieInDataDirectory(dir.path().to_path_buf());
                data_dir = Some(dir);
                auth
            }
            (None, Some(_)) => LaunchAuth::DaemonDefault,
        };

        let mut cmd = build_launch_command(config, &auth);
        self.notifier.info(format!(
            "Launching {} {CONTROL_PORT_FLAG} {} {}",
            config.executable.display(),
            config.control_port,
            auth.arguments()
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        ));

        let mut child = self
            .launcher
            .spawn(&mut cmd)
            .map_err(|e| SupervisorError::Launch {
                message: format!("Failed to launch {}: {e}", config.executable.display()),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        let pid = child.id();
        debug!("Spawned daemon (PID: {pid:?})");

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, self.notifier.clone(), false);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, self.notifier.clone(), true);
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let watcher = TokioSpawn(watch_daemon(child, kill_rx, self.notifier.clone()));

        self.handle = Some(DaemonHandle {
            pid,
            kill_tx: Some(kill_tx),
            watcher,
            data_dir,
        });

        let cookie_path = match auth {
            LaunchAuth::CookieInDataDirectory(dir) => Some(dir.join(COOKIE_FILE_NAME)),
            _ => None,
        };

        Ok(LaunchOutcome::Launched { pid, cookie_path })
    }

    /// Kill the daemon we launched and wait for it to exit.
    ///
    /// A missing or already-exited process is a silent no-op. The handle is
    /// cleared in every case, which removes its private data directory.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let Some(mut handle) = self.handle.take() else {
            trace!("Stop requested but no daemon was launched");
            return Ok(());
        };

        if !handle.is_alive() {
            trace!("Stop requested but daemon already exited");
            return Ok(());
        }

        if let Some(kill_tx) = handle.kill_tx.take() {
            let _ = kill_tx.send(());
        }

        let result = match handle.watcher.await {
            Ok(result) => result,
            Err(e) => Err(IoError::other(e)),
        };

        match result {
            Ok(status) => {
                self.notifier.info(format!(
                    "Tor process stopped (PID {}, {status})",
                    handle.pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
                ));
                Ok(())
            }
            Err(e) => Err(SupervisorError::Stop {
                message: format!("Failed to stop Tor process: {e}"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            }),
        }
    }

    async fn hash_password(
        &self,
        config: &DaemonConfig,
        password: &RedactedPassword,
    ) -> Result<String, SupervisorError> {
        debug!("Hashing control password via {HASH_PASSWORD_FLAG}");

        let mut cmd = build_hash_command(config, password);
        let child = self
            .launcher
            .spawn(&mut cmd)
            .map_err(|e| SupervisorError::Launch {
                message: format!("Failed to run {HASH_PASSWORD_FLAG}: {e}"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        let output = match timeout(config.launch_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SupervisorError::Launch {
                    message: format!("Failed to read {HASH_PASSWORD_FLAG} output: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                    source: e,
                });
            }
            Err(_) => {
                return Err(SupervisorError::Timeout {
                    message: format!(
                        "{HASH_PASSWORD_FLAG} did not finish within {:?}",
                        config.launch_timeout
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        if !output.status.success() {
            return Err(SupervisorError::PasswordHash {
                message: format!("{HASH_PASSWORD_FLAG} failed (exit status {})", output.status),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        parse_hashed_password(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            SupervisorError::PasswordHash {
                message: format!(
                    "{HASH_PASSWORD_FLAG} printed no hash (exit status {})",
                    output.status
                ),
                location: ErrorLocation::from(Location::caller()),
            }
        })
    }
}
