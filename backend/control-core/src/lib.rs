pub mod config;
pub mod control;
pub mod daemon;
pub mod error;
pub mod manager;
pub mod notify;

#[cfg(test)]
mod tests;

pub use config::{AuthMethod, DaemonConfig, Settings};
pub use daemon::discovery::DiscoveryResult;
pub use manager::{ConnectionState, ControlManager};
pub use notify::{Notification, NotificationKind, Notifier};

pub const TOR_BINARY: &str = "tor";
pub const TOR_PROCESS_NAME: &str = const_format::concatcp!(TOR_BINARY, std::env::consts::EXE_SUFFIX);
pub const CONTROL_HOST: &str = "127.0.0.1";
pub const DEFAULT_CONTROL_PORT: u16 = 9151;
pub const COOKIE_FILE_NAME: &str = "control_auth_cookie";
pub const TORRC_FILE_NAME: &str = "torrc";
