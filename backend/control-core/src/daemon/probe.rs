use crate::error::discovery::DiscoveryError;

use common::ErrorLocation;

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::panic::Location;
use std::path::PathBuf;

use log::trace;
use netstat2::{
    AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, SocketInfo, TcpState, get_sockets_info,
};
use sysinfo::{Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// What discovery needs to know about one running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub executable: Option<PathBuf>,
    pub command_line: String,
}

/// OS introspection used by discovery and liveness checks.
///
/// All methods block; async callers run them on the blocking pool.
pub trait SystemProbe: Send + Sync + 'static {
    /// Running processes whose name equals `name`, ordered by PID.
    fn processes_named(&self, name: &str) -> Result<Vec<ProcessSnapshot>, DiscoveryError>;

    /// TCP ports in LISTEN state owned by `pid`.
    fn listening_ports(&self, pid: u32) -> Result<BTreeSet<u16>, DiscoveryError>;
}

/// [`SystemProbe`] backed by `sysinfo` (processes) and `netstat2` (sockets).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProbe;

impl SystemProbe for NativeProbe {
    fn processes_named(&self, name: &str) -> Result<Vec<ProcessSnapshot>, DiscoveryError> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );

        trace!("Scanning {} processes for {name}", sys.processes().len());

        let mut matches: Vec<ProcessSnapshot> = sys
            .processes_by_exact_name(OsStr::new(name))
            .map(snapshot)
            .collect();
        matches.sort_by_key(|p| p.pid);

        Ok(matches)
    }

    fn listening_ports(&self, pid: u32) -> Result<BTreeSet<u16>, DiscoveryError> {
        let sockets = query_tcp_sockets()?;

        Ok(sockets
            .into_iter()
            .filter(|s| s.associated_pids.contains(&pid))
            .filter_map(|s| match s.protocol_socket_info {
                ProtocolSocketInfo::Tcp(tcp) if tcp.state == TcpState::Listen => {
                    Some(tcp.local_port)
                }
                _ => None,
            })
            .collect())
    }
}

#[track_caller]
fn query_tcp_sockets() -> Result<Vec<SocketInfo>, DiscoveryError> {
    get_sockets_info(
        AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6,
        ProtocolFlags::TCP,
    )
    .map_err(|e| DiscoveryError::NetworkQuery {
        message: format!("Failed to query network sockets: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })
}

fn snapshot(process: &Process) -> ProcessSnapshot {
    ProcessSnapshot {
        pid: process.pid().as_u32(),
        executable: process.exe().map(|p| p.to_path_buf()),
        command_line: format_command(process),
    }
}

pub(crate) fn format_command(process: &Process) -> String {
    process
        .cmd()
        .iter()
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
