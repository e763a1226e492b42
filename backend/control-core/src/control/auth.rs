use crate::config::{AuthMethod, DaemonConfig};
use crate::control::channel::ControlChannel;
use crate::error::auth::AuthError;
use crate::notify::Notifier;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

/// Substring of a reply that marks the handshake as accepted.
pub const SUCCESS_TOKEN: &str = "250 OK";

const AUTHENTICATE_COMMAND: &str = "AUTHENTICATE";
const PROBE_COMMAND: &str = "GETCONF";

pub(crate) fn password_request(password: &str) -> String {
    format!("{AUTHENTICATE_COMMAND} \"{password}\"")
}

pub(crate) fn cookie_request(cookie: &[u8]) -> String {
    format!("{AUTHENTICATE_COMMAND} {}", hex::encode_upper(cookie))
}

async fn read_cookie(path: &Path) -> Result<Vec<u8>, AuthError> {
    tokio::fs::read(path).await.map_err(|e| AuthError::CookieRead {
        path: path.to_path_buf(),
        location: ErrorLocation::from(Location::caller()),
        source: e,
    })
}

/// Build the handshake request for the configured method.
async fn handshake_request(config: &DaemonConfig) -> Result<(AuthMethod, String), AuthError> {
    let method = config.auth_method();

    let request = match (method, &config.control_password, &config.cookie_path) {
        (AuthMethod::Password, Some(password), _) => password_request(password.expose()),
        (AuthMethod::Cookie, _, Some(path)) => cookie_request(&read_cookie(path).await?),
        _ => PROBE_COMMAND.to_string(),
    };

    Ok((method, request))
}

/// Authenticate an open control channel.
///
/// Picks the method in priority order password > cookie > none:
/// 1. `AUTHENTICATE "<password>"`
/// 2. `AUTHENTICATE <UPPERCASE-HEX-COOKIE>` when the cookie file exists
/// 3. `GETCONF` as a probe for daemons that require no authentication
///
/// # Returns
///
/// * `Ok(AuthMethod)` - The reply contained `250 OK`; the method that succeeded
/// * `Err(AuthError::Rejected)` - Any other reply, carrying the raw text
/// * `Err(AuthError::Channel)` - The channel failed mid-handshake
/// * `Err(AuthError::CookieRead)` - The cookie file could not be read
pub async fn authenticate<S>(
    channel: &mut ControlChannel<S>,
    config: &DaemonConfig,
    notifier: &Notifier,
) -> Result<AuthMethod, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (method, request) = handshake_request(config).await?;
    debug!("Authenticating control connection using {method} method");

    let channel_error = |source| AuthError::Channel {
        method,
        location: ErrorLocation::from(Location::caller()),
        source,
    };

    channel.send(&request).await.map_err(channel_error)?;
    let response = channel.read_reply().await.map_err(channel_error)?;

    if !response.contains(SUCCESS_TOKEN) {
        return Err(AuthError::Rejected {
            method,
            response,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    notifier.info(format!("Authenticated using {method} method"));
    Ok(method)
}
