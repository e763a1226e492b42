use crate::commands::{Context, manager_with_printer, save_settings};
use crate::error::TorManagerError;

use control_core::{AuthMethod, ControlManager, DiscoveryResult};

use common::ErrorLocation;

use std::collections::BTreeSet;
use std::panic::Location;
use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use serde::Serialize;
use tokio::signal::ctrl_c;
use tokio::time::sleep;

const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Machine-readable form of [`DiscoveryResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub pid: u32,
    pub executable: PathBuf,
    pub candidate_ports: Vec<u16>,
    pub listening_ports: BTreeSet<u16>,
    pub data_directories: Vec<PathBuf>,
    pub confirmed_port: Option<u16>,
    pub cookie_path: Option<PathBuf>,
    pub ambiguous: bool,
}

impl From<&DiscoveryResult> for DiscoveryReport {
    fn from(result: &DiscoveryResult) -> Self {
        Self {
            pid: result.pid,
            executable: result.executable.clone(),
            candidate_ports: result.candidate_ports.clone(),
            listening_ports: result.listening_ports.clone(),
            data_directories: result.data_directories.clone(),
            confirmed_port: result.confirmed_port,
            cookie_path: result.cookie_path.clone(),
            ambiguous: result.is_ambiguous(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub executable: PathBuf,
    pub control_port: u16,
    pub auth_method: AuthMethod,
    pub cookie_path: Option<PathBuf>,
}

#[track_caller]
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, TorManagerError> {
    serde_json::to_string_pretty(value).map_err(|e| TorManagerError::TorManager {
        message: format!("Failed to render report: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Launch the daemon, wait for its control port, and keep it running until
/// Ctrl-C or until it exits on its own.
pub async fn start(context: &Context) -> Result<(), TorManagerError> {
    let (manager, printer) = manager_with_printer(context);

    let result = run_in_foreground(&manager).await;

    drop(manager);
    printer.finish().await;
    result
}

async fn run_in_foreground(manager: &ControlManager) -> Result<(), TorManagerError> {
    manager.start_daemon().await?;

    if let Err(e) = manager.wait_until_listening().await {
        manager.stop_daemon().await?;
        return Err(e.into());
    }

    manager
        .notifier()
        .info("Tor is running; press Ctrl-C to stop it");

    tokio::select! {
        signal = ctrl_c() => {
            signal.map_err(|e| TorManagerError::Terminal {
                message: "Failed to listen for Ctrl-C".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;
            debug!("Ctrl-C received, stopping Tor");
        }
        _ = wait_for_exit(manager) => {
            debug!("Tor exited on its own");
        }
    }

    manager.stop_daemon().await?;
    Ok(())
}

async fn wait_for_exit(manager: &ControlManager) {
    while manager.is_daemon_alive().await {
        sleep(LIVENESS_POLL_INTERVAL).await;
    }
}

/// Run discovery and print what was found; with `save`, persist the confirmed
/// port and cookie path.
pub async fn discover(context: &mut Context, save: bool) -> Result<(), TorManagerError> {
    let (manager, printer) = manager_with_printer(context);

    let result = manager.gather_process_info().await;

    drop(manager);
    printer.finish().await;
    let result = result?;

    let report = DiscoveryReport::from(&result);
    if context.json {
        println!("{}", to_json(&report)?);
    } else {
        print_discovery(&report);
    }

    if save {
        let daemon = &mut context.settings.daemon;
        if let Some(port) = report.confirmed_port {
            daemon.control_port = port;
        }
        if report.cookie_path.is_some() {
            daemon.cookie_path = report.cookie_path.clone();
        }
        daemon.executable_path = Some(report.executable.clone());
        save_settings(&context.settings, &context.settings_dir)?;
    }

    Ok(())
}

fn print_discovery(report: &DiscoveryReport) {
    println!("PID:              {}", report.pid);
    println!("Executable:       {}", report.executable.display());
    println!("Candidate ports:  {:?}", report.candidate_ports);
    println!("Listening ports:  {:?}", report.listening_ports);
    match report.confirmed_port {
        Some(port) => println!("Control port:     {port}"),
        None => println!("Control port:     not confirmed"),
    }
    match &report.cookie_path {
        Some(path) => println!("Cookie:           {}", path.display()),
        None => println!("Cookie:           not found"),
    }
    for dir in &report.data_directories {
        println!("Data directory:   {}", dir.display());
    }
    if report.ambiguous {
        println!("Warning: several data directories found; the active one is ambiguous");
    }
}

/// Send one command and print the raw reply.
pub async fn send(context: &Context, discover: bool, command: &str) -> Result<(), TorManagerError> {
    let (manager, printer) = manager_with_printer(context);

    let result = async {
        if discover {
            manager.gather_process_info().await?;
        }
        let reply = manager.send_command(command).await?;
        manager.disconnect().await;
        Ok::<_, TorManagerError>(reply)
    }
    .await;

    drop(manager);
    printer.finish().await;

    print!("{}", result?);
    Ok(())
}

pub async fn status(context: &Context) -> Result<(), TorManagerError> {
    let (manager, printer) = manager_with_printer(context);

    let running = manager.is_running().await;
    let config = manager.config().await;

    drop(manager);
    printer.finish().await;

    let report = StatusReport {
        running: running?,
        executable: config.executable.clone(),
        control_port: config.control_port,
        auth_method: config.auth_method(),
        cookie_path: config.cookie_path.clone(),
    };

    if context.json {
        println!("{}", to_json(&report)?);
    } else {
        println!(
            "Tor is {}",
            if report.running { "running" } else { "not running" }
        );
        println!("Executable:   {}", report.executable.display());
        println!("Control port: {}", report.control_port);
        println!("Auth method:  {}", report.auth_method);
    }

    Ok(())
}
