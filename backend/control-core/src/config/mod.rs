//! Runtime daemon configuration and the persisted settings file.
//!
//! [`DaemonConfig`] is what the manager works with: it holds the secret
//! password and the timeouts. [`Settings`] is the on-disk shape the front end
//! loads and saves; it deliberately has no password field.

use crate::DEFAULT_CONTROL_PORT;
use crate::error::config::ConfigError;

use common::{ErrorLocation, RedactedPassword};

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_DIR_NAME: &str = "tor-manager";
const CONFIG_VERSION: u32 = 1;
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

/// How the control connection authenticates.
///
/// Never stored; derived from [`DaemonConfig`] in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthMethod {
    Password,
    Cookie,
    None,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::Cookie => "cookie",
            AuthMethod::None => "none",
        }
    }
}

impl Display for AuthMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(self.as_str())
    }
}

// ============================================
// RUNTIME CONFIG
// ============================================

/// Everything the manager needs to launch and talk to the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub executable: PathBuf,
    pub control_port: u16,
    pub control_password: Option<RedactedPassword>,
    pub cookie_path: Option<PathBuf>,
    /// Applies to channel connect, each write and each read.
    pub io_timeout: Duration,
    /// Applies to the `--hash-password` subprocess.
    pub launch_timeout: Duration,
    /// How long to wait for a freshly launched daemon to bind its control port.
    pub startup_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            control_port: DEFAULT_CONTROL_PORT,
            control_password: None,
            cookie_path: None,
            io_timeout: DEFAULT_IO_TIMEOUT,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }
}

impl DaemonConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    pub fn with_password(mut self, password: Option<RedactedPassword>) -> Self {
        self.control_password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_cookie_path(mut self, cookie_path: Option<PathBuf>) -> Self {
        self.cookie_path = cookie_path.filter(|p| !p.as_os_str().is_empty());
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Authentication method in priority order password > cookie > none.
    ///
    /// The cookie method requires the cookie file to exist at call time.
    pub fn auth_method(&self) -> AuthMethod {
        if self.control_password.as_ref().is_some_and(|p| !p.is_empty()) {
            AuthMethod::Password
        } else if self.cookie_path.as_ref().is_some_and(|p| p.is_file()) {
            AuthMethod::Cookie
        } else {
            AuthMethod::None
        }
    }

    /// Build the runtime config from persisted settings plus a password
    /// supplied out of band.
    pub fn from_settings(settings: &Settings, password: Option<RedactedPassword>) -> Self {
        Self::new(settings.daemon.executable_path.clone().unwrap_or_default())
            .with_control_port(settings.daemon.control_port)
            .with_password(password)
            .with_cookie_path(settings.daemon.cookie_path.clone())
    }
}

// ============================================
// PERSISTED SETTINGS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSettings {
    pub executable_path: Option<PathBuf>,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    pub cookie_path: Option<PathBuf>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            executable_path: None,
            control_port: default_control_port(),
            cookie_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub daemon: DaemonSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            daemon: DaemonSettings::default(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

impl Settings {
    /// Platform config directory for the settings file, e.g.
    /// `~/.config/tor-manager` on Linux.
    #[track_caller]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .ok_or_else(|| ConfigError::DirectoryNotFound {
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Load settings from {config_dir}/config.json.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Settings)` if loaded successfully or defaults if file missing.
    /// Returns `Err(ConfigError)` if file exists but is corrupted/invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Settings file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read settings file: {e}");
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse settings JSON: {e}");
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        settings.validate()?;

        info!("Settings loaded from {}", config_path.display());
        Ok(settings)
    }

    /// Save settings to {config_dir}/config.json using atomic write.
    ///
    /// Uses temp file + rename so a crash never leaves a half-written file.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Settings saved to {}", config_path.display());
        Ok(())
    }

    /// Validate settings values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if:
    /// - the version is newer than this build understands
    /// - the control port is 0
    #[track_caller]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Settings version {} is newer than supported version {CONFIG_VERSION}",
                    self.version
                ),
            });
        }

        if self.daemon.control_port == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "Control port must be between 1 and 65535".to_string(),
            });
        }

        Ok(())
    }
}
