use crate::error::{AuthError, ChannelError, ConfigError, DiscoveryError, SupervisorError};

use common::ErrorLocation;

use std::error::Error as StdError;

use thiserror::Error as ThisError;

/// Errors surfaced by [`ControlManager`](crate::manager::ControlManager).
#[derive(Debug, ThisError)]
pub enum ControlError {
    /// Opening or authenticating the control connection failed.
    ///
    /// The source is either a [`ChannelError`] or an [`AuthError`].
    #[error("Connection Error: {message} {location}")]
    Connection {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A command round-trip failed after the connection was established.
    #[error("Command Error: {message} {location}")]
    Command {
        message: String,
        location: ErrorLocation,
        #[source]
        source: ChannelError,
    },

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ControlError {
    /// The authentication failure behind a connection error, if any.
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            ControlError::Connection { source, .. } => source.downcast_ref::<AuthError>(),
            _ => None,
        }
    }
}
