//! Reconcile configuration with a daemon that is already running.
//!
//! When the daemon was started by someone else, its real control port, data
//! directory and cookie file are unknown. Discovery cross-references three
//! sources of evidence:
//!
//! 1. The process command line (`ControlPort`, `__ControlPort`, `DataDirectory`)
//! 2. The sockets the process is actually listening on
//! 3. The on-disk `torrc` and `control_auth_cookie` in the bundle layout
//!    `<exe dir>/../Data/Tor`
//!
//! A candidate port only becomes the *confirmed* port when the process is
//! listening on it. Everything here is best effort: missing files and
//! malformed `torrc` lines are reported and skipped.

use crate::daemon::probe::{ProcessSnapshot, SystemProbe};
use crate::error::discovery::DiscoveryError;
use crate::notify::Notifier;
use crate::{COOKIE_FILE_NAME, TOR_PROCESS_NAME, TORRC_FILE_NAME};

use common::ErrorLocation;

use std::collections::BTreeSet;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use log::{debug, trace};
use regex::Regex;
use tokio::task::spawn_blocking;

const COMMAND_LINE_PATTERN: &str =
    r#"(?i)(DataDirectory|\+?__ControlPort|ControlPort)(?:\s+("[^"]*"|\S*))?"#;
const DATA_DIRECTORY_KEY: &str = "datadirectory";
const CONTROL_PORT_KEY: &str = "controlport";
const TORRC_CONTROL_PORT_PREFIX: &str = "controlport ";
const BUNDLE_DATA_DIR: [&str; 2] = ["Data", "Tor"];

static COMMAND_LINE_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn get_command_line_regex() -> &'static Regex {
    COMMAND_LINE_REGEX
        .get_or_init(|| Regex::new(COMMAND_LINE_PATTERN).expect("valid regex pattern"))
}

/// What discovery learned about the running daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    pub pid: u32,
    pub executable: PathBuf,
    /// Plausible control ports, seed port first, in discovery order.
    pub candidate_ports: Vec<u16>,
    pub listening_ports: BTreeSet<u16>,
    /// Plausible data directories, in discovery order.
    pub data_directories: Vec<PathBuf>,
    /// First candidate port the process is actually listening on.
    pub confirmed_port: Option<u16>,
    pub cookie_path: Option<PathBuf>,
}

impl DiscoveryResult {
    /// More than one distinct data directory was found.
    pub fn is_ambiguous(&self) -> bool {
        self.data_directories.len() > 1
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CommandLineFindings {
    pub(crate) ports: Vec<u16>,
    pub(crate) data_directories: Vec<PathBuf>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    if items.contains(&item) {
        false
    } else {
        items.push(item);
        true
    }
}

/// Parse a `ControlPort` value: a bare port, or `address:port`.
pub(crate) fn parse_port_value(value: &str) -> Option<u16> {
    let port = match value.rsplit_once(':') {
        Some((_, port)) => port,
        None => value,
    };

    port.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

pub(crate) fn parse_command_line(command_line: &str) -> CommandLineFindings {
    let mut findings = CommandLineFindings::default();

    for cap in get_command_line_regex().captures_iter(command_line) {
        let key = cap[1].to_ascii_lowercase();
        let Some(value) = cap.get(2).map(|m| m.as_str().trim_matches('"')) else {
            continue;
        };

        if key.contains(CONTROL_PORT_KEY) {
            if let Some(port) = parse_port_value(value) {
                push_unique(&mut findings.ports, port);
            }
        } else if key == DATA_DIRECTORY_KEY && !value.is_empty() {
            push_unique(&mut findings.data_directories, PathBuf::from(value));
        }
    }

    findings
}

/// Outcome of scanning a torrc file.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TorrcFindings {
    pub(crate) ports: Vec<u16>,
    /// `(line number, raw value)` for ControlPort lines that did not parse.
    pub(crate) rejected: Vec<(usize, String)>,
}

pub(crate) fn parse_torrc(contents: &str) -> TorrcFindings {
    let mut findings = TorrcFindings::default();

    for (index, line) in contents.lines().enumerate() {
        let cleaned = line.trim();
        let is_control_port = cleaned
            .get(..TORRC_CONTROL_PORT_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(TORRC_CONTROL_PORT_PREFIX));

        if !is_control_port {
            continue;
        }

        let value = cleaned.split_whitespace().nth(1).unwrap_or_default();
        match parse_port_value(value) {
            Some(port) => {
                push_unique(&mut findings.ports, port);
            }
            None => findings.rejected.push((index + 1, value.to_string())),
        }
    }

    findings
}

/// `<exe dir>/../Data/Tor`, the portable bundle layout.
pub(crate) fn default_data_directory(executable: &Path) -> PathBuf {
    let exe_dir = executable.parent().unwrap_or(Path::new(""));
    let base = match exe_dir.parent() {
        Some(parent) => parent.to_path_buf(),
        None => exe_dir.join(".."),
    };

    BUNDLE_DATA_DIR.iter().fold(base, |path, part| path.join(part))
}

/// First existing cookie file: the bundle default, then each data directory.
pub(crate) fn resolve_cookie_path(
    default_dir: &Path,
    data_directories: &[PathBuf],
) -> Option<PathBuf> {
    std::iter::once(default_dir)
        .chain(data_directories.iter().map(PathBuf::as_path))
        .map(|dir| dir.join(COOKIE_FILE_NAME))
        .find(|path| path.is_file())
}

#[track_caller]
fn executable_path(subject: &ProcessSnapshot) -> Result<PathBuf, DiscoveryError> {
    subject
        .executable
        .clone()
        .or_else(|| {
            subject
                .command_line
                .split_whitespace()
                .next()
                .map(|token| PathBuf::from(token.trim_matches('"')))
        })
        .ok_or_else(|| DiscoveryError::SystemQuery {
            message: format!("Cannot determine executable path of PID {}", subject.pid),
            location: ErrorLocation::from(Location::caller()),
        })
}

/// Run discovery synchronously against `probe`.
///
/// `seed_port` (normally the configured control port) pre-seeds the
/// candidate set so a daemon started with our own arguments is confirmed.
///
/// # Errors
///
/// * [`DiscoveryError::NoProcessFound`] - No daemon process is running
/// * [`DiscoveryError::SystemQuery`] / [`DiscoveryError::NetworkQuery`] - OS introspection failed
pub fn discover_with<P>(
    probe: &P,
    seed_port: u16,
    notifier: &Notifier,
) -> Result<DiscoveryResult, DiscoveryError>
where
    P: SystemProbe + ?Sized,
{
    debug!("Starting daemon discovery with seed port {seed_port}");

    let subject = probe
        .processes_named(TOR_PROCESS_NAME)?
        .into_iter()
        .next()
        .ok_or_else(|| DiscoveryError::NoProcessFound {
            message: format!("No running {TOR_PROCESS_NAME} process found"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let executable = executable_path(&subject)?;
    trace!(
        "Discovery subject: PID {} at {}",
        subject.pid,
        executable.display()
    );

    let mut report = vec![format!(
        "Found {TOR_PROCESS_NAME} process (PID {}) at {}",
        subject.pid,
        executable.display()
    )];

    let mut candidate_ports = vec![seed_port];
    let mut data_directories = Vec::new();

    let arguments = parse_command_line(&subject.command_line);
    for port in arguments.ports {
        if push_unique(&mut candidate_ports, port) {
            report.push(format!("Found ControlPort {port} in arguments"));
        }
    }
    for dir in arguments.data_directories {
        report.push(format!("Found DataDirectory {} in arguments", dir.display()));
        push_unique(&mut data_directories, dir);
    }

    let listening_ports = probe.listening_ports(subject.pid)?;
    for port in &listening_ports {
        report.push(format!("Process is listening on port {port}"));
    }

    let default_dir = default_data_directory(&executable);
    push_unique(&mut data_directories, default_dir.clone());

    let cookie_path = resolve_cookie_path(&default_dir, &data_directories);
    match &cookie_path {
        Some(path) => report.push(format!("Found {COOKIE_FILE_NAME} at {}", path.display())),
        None => report.push(format!("{COOKIE_FILE_NAME} not found")),
    }

    let torrc_path = default_dir.join(TORRC_FILE_NAME);
    if torrc_path.is_file() {
        match std::fs::read_to_string(&torrc_path) {
            Ok(contents) => {
                let torrc = parse_torrc(&contents);
                for port in torrc.ports {
                    if push_unique(&mut candidate_ports, port) {
                        report.push(format!("Found ControlPort {port} in torrc"));
                    }
                }
                for (line, value) in torrc.rejected {
                    notifier.error(format!(
                        "Ignoring {} line {line}: cannot parse ControlPort value {value:?}",
                        torrc_path.display()
                    ));
                }
            }
            Err(e) => notifier.error(format!(
                "Failed to read {}: {e}",
                torrc_path.display()
            )),
        }
    } else {
        report.push(format!("No torrc found at {}", torrc_path.display()));
    }

    let confirmed_port = candidate_ports
        .iter()
        .copied()
        .find(|port| listening_ports.contains(port));

    match confirmed_port {
        Some(port) => report.push(format!("Confirmed control port {port}")),
        None => report.push(
            "No candidate control port is being listened on; keeping configured port"
                .to_string(),
        ),
    }

    if data_directories.len() > 1 {
        for dir in &data_directories {
            report.push(dir.display().to_string());
        }
        report.push("Multiple data directories found; the active one is ambiguous".to_string());
    } else if let Some(dir) = data_directories.first() {
        report.push(format!("Confirmed data directory {}", dir.display()));
    }

    notifier.info(report.join("\n"));

    Ok(DiscoveryResult {
        pid: subject.pid,
        executable,
        candidate_ports,
        listening_ports,
        data_directories,
        confirmed_port,
        cookie_path,
    })
}

/// Run [`discover_with`] on the blocking pool.
pub async fn discover<P>(
    probe: Arc<P>,
    seed_port: u16,
    notifier: Notifier,
) -> Result<DiscoveryResult, DiscoveryError>
where
    P: SystemProbe + ?Sized,
{
    spawn_blocking(move || discover_with(probe.as_ref(), seed_port, &notifier))
        .await
        .map_err(|e| DiscoveryError::Worker {
            message: format!("Discovery worker failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?
}
