// Unit tests for discovery's parsing helpers
// The end-to-end algorithm with a fabricated probe is in integration_tests/discovery.rs

use crate::daemon::discovery::{
    default_data_directory, get_command_line_regex, parse_command_line, parse_port_value,
    parse_torrc, resolve_cookie_path,
};

use std::path::{Path, PathBuf};

use tempfile::tempdir;

/// **VALUE**: Tor Browser's launch line yields its control port and data directory.
///
/// **WHY THIS MATTERS**: The bundled browser starts the daemon with
/// `+__ControlPort address:port` and a quoted `DataDirectory`. Missing either
/// means discovery cannot find the real port or cookie.
///
/// **BUG THIS CATCHES**: Would catch the `__ControlPort` alternative being dropped,
/// the address not being stripped, or quotes being kept in the path.
#[test]
fn given_browser_command_line_when_parsed_then_extracts_port_and_directory() {
    // GIVEN: A command line like the one the browser bundle uses
    let command_line = r#"C:\Tor Browser\TorBrowser\Tor\tor.exe -f "C:\Tor Browser\Data\Tor\torrc" DataDirectory "C:\Tor Browser\Data\Tor" +__ControlPort 127.0.0.1:9151 +__SocksPort "127.0.0.1:9150 IPv6Traffic""#;

    // WHEN: Parsing it
    let findings = parse_command_line(command_line);

    // THEN: Port and directory are extracted
    assert_eq!(findings.ports, vec![9151]);
    assert_eq!(
        findings.data_directories,
        vec![PathBuf::from(r"C:\Tor Browser\Data\Tor")]
    );
}

/// **VALUE**: Our own launch arguments are recognized case-insensitively.
///
/// **WHY THIS MATTERS**: A daemon we launched earlier (and then lost track of)
/// carries `--ControlPort <port>`; it must be rediscovered.
///
/// **BUG THIS CATCHES**: Would catch case-sensitive matching or duplicated ports.
#[test]
fn given_plain_flags_when_parsed_then_ports_are_deduplicated() {
    // GIVEN: Mixed-case flags with a repeated port
    let command_line = "/usr/bin/tor --controlport 9051 --ControlPort 9051 --CONTROLPORT 9052 --datadirectory /var/lib/tor";

    // WHEN: Parsing
    let findings = parse_command_line(command_line);

    // THEN: Unique ports in order, directory found
    assert_eq!(findings.ports, vec![9051, 9052]);
    assert_eq!(findings.data_directories, vec![PathBuf::from("/var/lib/tor")]);
}

/// **VALUE**: Tokens without a usable value are ignored.
///
/// **WHY THIS MATTERS**: Options like `ControlPortWriteToFile` or a trailing flag
/// without a value must not produce bogus candidates.
///
/// **BUG THIS CATCHES**: Would catch `ControlPort` prefixes being parsed as ports.
#[test]
fn given_flags_without_values_when_parsed_then_nothing_is_found() {
    // GIVEN: Prefix-only options and a dangling flag
    let command_line = "tor --ControlPortWriteToFile /tmp/port --ControlPort auto --ControlPort";

    // WHEN: Parsing
    let findings = parse_command_line(command_line);

    // THEN: No ports are found
    assert!(findings.ports.is_empty(), "Got {:?}", findings.ports);
    assert!(findings.data_directories.is_empty());
}

#[test]
fn given_command_line_regex_when_applied_then_captures_key_and_quoted_value() {
    let re = get_command_line_regex();
    let caps = re.captures(r#"DataDirectory "/a b/c""#).unwrap();
    assert_eq!(&caps[1], "DataDirectory");
    assert_eq!(&caps[2], r#""/a b/c""#);
}

#[test]
fn given_port_values_when_parsed_then_handles_address_and_rejects_garbage() {
    assert_eq!(parse_port_value("9151"), Some(9151));
    assert_eq!(parse_port_value("127.0.0.1:9151"), Some(9151));
    assert_eq!(parse_port_value("[::1]:9051"), Some(9051));
    assert_eq!(parse_port_value("auto"), None);
    assert_eq!(parse_port_value("0"), None);
    assert_eq!(parse_port_value("70000"), None);
    assert_eq!(parse_port_value(""), None);
}

/// **VALUE**: torrc `ControlPort` lines contribute ports; bad values are reported.
///
/// **WHY THIS MATTERS**: A hand-edited torrc may contain `ControlPort auto` or
/// typos. Those must be reported with their line number but never abort discovery.
///
/// **BUG THIS CATCHES**: Would catch case-sensitive matching, comments being
/// parsed, or a panic on a bad value.
#[test]
fn given_torrc_when_parsed_then_collects_ports_and_rejected_lines() {
    // GIVEN: A torrc with valid, commented and invalid ControlPort lines
    let torrc = "\
# ControlPort 1111
SocksPort 9150
  controlport 9151
ControlPort 127.0.0.1:9251
ControlPort auto
ControlPortWriteToFile /tmp/port
";

    // WHEN: Parsing
    let findings = parse_torrc(torrc);

    // THEN: Valid ports are collected and the bad line is reported
    assert_eq!(findings.ports, vec![9151, 9251]);
    assert_eq!(findings.rejected, vec![(5, "auto".to_string())]);
}

#[test]
fn given_executable_when_default_data_directory_called_then_uses_bundle_layout() {
    let dir = default_data_directory(Path::new("/opt/tor-browser/Browser/TorBrowser/Tor/tor"));
    assert_eq!(
        dir,
        PathBuf::from("/opt/tor-browser/Browser/TorBrowser/Data/Tor")
    );
}

/// **VALUE**: The bundle-layout cookie wins over cookies in other data directories.
///
/// **WHY THIS MATTERS**: Cookie resolution has a fixed order; picking a stale
/// cookie from another directory makes authentication fail.
///
/// **BUG THIS CATCHES**: Would catch the search order being reversed.
#[test]
fn given_cookies_in_several_dirs_when_resolved_then_default_dir_wins() {
    // GIVEN: A cookie in the default dir and one in another data dir
    let root = tempdir().unwrap();
    let default_dir = root.path().join("Data").join("Tor");
    let other_dir = root.path().join("other");
    std::fs::create_dir_all(&default_dir).unwrap();
    std::fs::create_dir_all(&other_dir).unwrap();
    std::fs::write(default_dir.join("control_auth_cookie"), [1u8; 32]).unwrap();
    std::fs::write(other_dir.join("control_auth_cookie"), [2u8; 32]).unwrap();

    // WHEN: Resolving the cookie path
    let resolved = resolve_cookie_path(&default_dir, &[other_dir.clone()]);

    // THEN: The default dir's cookie is chosen
    assert_eq!(resolved, Some(default_dir.join("control_auth_cookie")));

    // AND: Without it, the other directory is used
    std::fs::remove_file(default_dir.join("control_auth_cookie")).unwrap();
    let resolved = resolve_cookie_path(&default_dir, &[other_dir.clone()]);
    assert_eq!(resolved, Some(other_dir.join("control_auth_cookie")));
}
