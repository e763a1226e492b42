use crate::commands::session::{SessionInput, is_confirmation};

#[test]
fn given_plain_text_when_parsed_then_is_control_command() {
    assert_eq!(
        SessionInput::parse("  GETINFO version \r\n"),
        SessionInput::Command("GETINFO version".to_string())
    );
    assert_eq!(SessionInput::parse("   "), SessionInput::Empty);
}

/// **VALUE**: Slash commands are recognized case-insensitively and unknown ones
/// are not sent to the daemon.
///
/// **WHY THIS MATTERS**: A typo like `/qiut` must not be sent to Tor as a
/// control command.
///
/// **BUG THIS CATCHES**: Would catch unknown session commands falling through to
/// `Command`.
#[test]
fn given_slash_commands_when_parsed_then_map_to_session_actions() {
    assert_eq!(SessionInput::parse("/quit"), SessionInput::Quit);
    assert_eq!(SessionInput::parse("/EXIT"), SessionInput::Quit);
    assert_eq!(SessionInput::parse("/start"), SessionInput::Start);
    assert_eq!(SessionInput::parse("/stop"), SessionInput::Stop);
    assert_eq!(SessionInput::parse("/discover"), SessionInput::Discover);
    assert_eq!(SessionInput::parse("/connect"), SessionInput::Connect);
    assert_eq!(SessionInput::parse("/disconnect"), SessionInput::Disconnect);
    assert_eq!(SessionInput::parse("/status"), SessionInput::Status);
    assert_eq!(SessionInput::parse("/?"), SessionInput::Help);
    assert_eq!(
        SessionInput::parse("/qiut"),
        SessionInput::Unknown("qiut".to_string())
    );
}

/// **VALUE**: Only an explicit yes forces an exit after a failed stop.
///
/// **WHY THIS MATTERS**: Exiting leaves the daemon orphaned; the default must
/// be to stay.
///
/// **BUG THIS CATCHES**: Would catch empty input or end of input being taken as yes.
#[test]
fn given_answers_when_checked_then_only_yes_confirms() {
    assert!(is_confirmation(Some("y")));
    assert!(is_confirmation(Some(" YES \n")));
    assert!(!is_confirmation(Some("")));
    assert!(!is_confirmation(Some("n")));
    assert!(!is_confirmation(Some("yeah")));
    assert!(!is_confirmation(None));
}
