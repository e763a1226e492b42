use control_core::AuthMethod;
use control_core::error::{AuthError, ChannelError, ControlError, SupervisorError, render_chain};

use common::ErrorLocation;

use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;

/// **VALUE**: Supervisor errors keep their own message when wrapped.
///
/// **WHY THIS MATTERS**: The front end prints `ControlError` directly; wrapping
/// must not add a layer of noise in front of the real failure.
///
/// **BUG THIS CATCHES**: Would catch the transparent wrapper being replaced by a
/// generic message.
#[test]
fn given_supervisor_error_when_wrapped_then_display_is_unchanged() {
    let inner = SupervisorError::ExecutableNotFound {
        path: "/opt/tor/tor".into(),
        location: ErrorLocation::from(Location::caller()),
    };
    let expected = inner.to_string();

    let wrapped = ControlError::from(inner);

    assert_eq!(wrapped.to_string(), expected);
    assert!(expected.starts_with("Executable Not Found Error: /opt/tor/tor"));
}

#[test]
fn given_auth_failure_when_wrapped_then_auth_error_is_recoverable() {
    let err = ControlError::Connection {
        message: "Authentication using cookie method failed".to_string(),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(AuthError::Rejected {
            method: AuthMethod::Cookie,
            response: "515 Authentication failed: Wrong length on authentication cookie."
                .to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
    };

    let auth = err.auth_error().expect("auth error should be recoverable");

    assert_eq!(auth.method(), AuthMethod::Cookie);
    assert_eq!(
        auth.response(),
        Some("515 Authentication failed: Wrong length on authentication cookie.")
    );
    assert!(render_chain(&err).contains("caused by: Auth Error: cookie authentication rejected"));
}

#[test]
fn given_channel_failure_when_wrapped_then_auth_error_is_none() {
    let err = ControlError::Connection {
        message: "Cannot open control connection".to_string(),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(ChannelError::Connect {
            message: "Failed to connect".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: IoError::new(ErrorKind::ConnectionRefused, "refused"),
        }),
    };

    assert!(err.auth_error().is_none());
}
