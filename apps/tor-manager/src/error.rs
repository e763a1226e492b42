use control_core::error::{ConfigError, ControlError};

use common::ErrorLocation;

use std::io::Error as IoError;

use thiserror::Error;

/// Errors surfaced by the command-line front end.
///
/// Core failures keep their own message; the front end only adds variants for
/// what it does itself.
#[derive(Debug, Error)]
pub enum TorManagerError {
    /// Error from this app
    #[error("Tor Manager Error: {message} {location}")]
    TorManager {
        message: String,
        location: ErrorLocation,
    },

    /// Reading from or writing to the terminal failed
    #[error("Terminal Error: {message} {location}")]
    Terminal {
        message: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    /// Error from control-core operations (launch, connect, discovery, ...)
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Loading or saving the settings file failed
    #[error(transparent)]
    Config(#[from] ConfigError),
}
