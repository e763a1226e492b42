// Unit tests for the native OS probe
// These touch the real process and socket tables of the test process itself

use crate::daemon::probe::{NativeProbe, SystemProbe};

use std::net::TcpListener;

/// **VALUE**: The socket-table scan sees a port this very process listens on.
///
/// **WHY THIS MATTERS**: Port confirmation is the heart of discovery. If the
/// listen table is not attributed to the right PID, no port is ever confirmed.
///
/// **BUG THIS CATCHES**: Would catch filtering on the wrong TCP state or
/// ignoring `associated_pids`.
#[test]
fn given_bound_listener_when_listening_ports_called_then_contains_port() {
    // GIVEN: A listener bound by this process
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // WHEN: Querying our own listening ports
    let ports = NativeProbe.listening_ports(std::process::id()).unwrap();

    // THEN: The bound port is reported
    assert!(ports.contains(&port), "Expected {port} in {ports:?}");
}

/// **VALUE**: Scanning for a process name nobody uses returns an empty list.
///
/// **WHY THIS MATTERS**: "No daemon running" is the common case and must not be
/// an error at the probe level; discovery turns it into NoProcessFound itself.
///
/// **BUG THIS CATCHES**: Would catch the probe erroring or panicking on no match.
#[test]
fn given_unknown_name_when_processes_named_called_then_returns_empty() {
    // GIVEN: A name no process has
    let name = "no-such-daemon-7f3a";

    // WHEN: Scanning processes
    let processes = NativeProbe.processes_named(name).unwrap();

    // THEN: Nothing is found
    assert!(processes.is_empty());
}
