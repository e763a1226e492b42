//! Connection state tracking for the control channel.

use std::fmt::{Display, Formatter, Result as FormatResult};

/// Where the control connection is in its lifecycle.
///
/// Transitions:
/// - `Disconnected -> Connecting` when a connect attempt starts
/// - `Connecting -> Authenticated` when the handshake succeeds
/// - `Connecting -> Disconnected` on handshake or I/O failure
/// - `Authenticated -> Disconnected` on explicit disconnect or channel error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticated,
}

impl ConnectionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ConnectionState::Authenticated)
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Authenticated => f.write_str("authenticated"),
        }
    }
}
