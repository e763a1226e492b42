pub mod auth;
pub mod channel;
pub mod config;
pub mod control;
pub mod discovery;
pub mod supervisor;

pub use auth::AuthError;
pub use channel::ChannelError;
pub use config::ConfigError;
pub use control::ControlError;
pub use discovery::DiscoveryError;
pub use supervisor::SupervisorError;

use std::error::Error as StdError;
use std::fmt::Write;

/// Render an error and its full `source()` chain on one line per cause.
///
/// Used for Error notifications so the collaborator sees the origin of a
/// failure, not just the outermost message.
pub fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let _ = write!(rendered, "\n  caused by: {cause}");
        source = cause.source();
    }

    rendered
}
