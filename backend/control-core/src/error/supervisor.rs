use common::ErrorLocation;

use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SupervisorError {
    #[error("Executable Not Found Error: {} {location}", .path.display())]
    ExecutableNotFound {
        path: PathBuf,
        location: ErrorLocation,
    },

    #[error("Launch Error: {message} {location}")]
    Launch {
        message: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Password Hash Error: {message} {location}")]
    PasswordHash {
        message: String,
        location: ErrorLocation,
    },

    #[error("Stop Error: {message} {location}")]
    Stop {
        message: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },
}
