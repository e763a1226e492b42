use crate::cli::{Cli, Command, ConfigAction};

use clap::{CommandFactory, Parser};

#[test]
fn given_cli_definition_when_debug_asserted_then_is_consistent() {
    Cli::command().debug_assert();
}

/// **VALUE**: `send` takes the rest of the line as the control command.
///
/// **WHY THIS MATTERS**: Control commands contain spaces and may contain
/// hyphenated values; they must reach the daemon intact.
///
/// **BUG THIS CATCHES**: Would catch clap treating the command words as flags
/// or as separate subcommands.
#[test]
fn given_send_with_words_when_parsed_then_collects_command() {
    let cli = Cli::try_parse_from([
        "tor-manager",
        "--port",
        "9051",
        "send",
        "SETCONF",
        "ExitNodes={us}",
        "-StrictNodes",
    ])
    .unwrap();

    assert_eq!(cli.port, Some(9051));
    assert_eq!(
        cli.command,
        Command::Send {
            discover: false,
            command: vec![
                "SETCONF".to_string(),
                "ExitNodes={us}".to_string(),
                "-StrictNodes".to_string(),
            ],
        }
    );
}

#[test]
fn given_config_set_when_parsed_then_fields_are_optional() {
    let cli = Cli::try_parse_from(["tor-manager", "config", "set", "--control-port", "9151"])
        .unwrap();

    assert_eq!(
        cli.command,
        Command::Config {
            action: ConfigAction::Set {
                executable_path: None,
                control_port: Some(9151),
                cookie_path: None,
                clear_cookie: false,
            },
        }
    );
}

#[test]
fn given_cookie_and_clear_when_parsed_then_rejected() {
    let result = Cli::try_parse_from([
        "tor-manager",
        "config",
        "set",
        "--cookie-path",
        "/tmp/cookie",
        "--clear-cookie",
    ]);

    assert!(result.is_err());
}
