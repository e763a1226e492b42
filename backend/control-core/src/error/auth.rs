use crate::config::AuthMethod;
use crate::error::channel::ChannelError;

use common::ErrorLocation;

use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum AuthError {
    #[error("Auth Error: {method} authentication rejected, response: {response:?} {location}")]
    Rejected {
        method: AuthMethod,
        response: String,
        location: ErrorLocation,
    },

    #[error("Auth Error: failed to read cookie file {}: {source} {location}", .path.display())]
    CookieRead {
        path: PathBuf,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Auth Error: {method} handshake failed {location}")]
    Channel {
        method: AuthMethod,
        location: ErrorLocation,
        #[source]
        source: ChannelError,
    },
}

impl AuthError {
    /// The authentication method that was attempted.
    pub fn method(&self) -> AuthMethod {
        match self {
            AuthError::Rejected { method, .. } | AuthError::Channel { method, .. } => *method,
            AuthError::CookieRead { .. } => AuthMethod::Cookie,
        }
    }

    /// Raw daemon response, if the daemon answered at all.
    pub fn response(&self) -> Option<&str> {
        match self {
            AuthError::Rejected { response, .. } => Some(response),
            _ => None,
        }
    }
}
