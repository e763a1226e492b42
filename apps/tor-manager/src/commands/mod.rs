//! Command handlers.
//!
//! Every handler gets a [`Context`] built from the settings file and the
//! global flags. Handlers that talk to the daemon build one
//! [`ControlManager`] and hand it the notifier the printer listens to.

pub mod config;
pub mod daemon;
pub mod session;

use crate::cli::{Cli, Command};
use crate::error::TorManagerError;
use crate::printer::NotificationPrinter;

use control_core::{ControlManager, DaemonConfig, Settings, TOR_PROCESS_NAME};

use common::RedactedPassword;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

/// Settings plus the per-invocation overrides from the command line.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings_dir: PathBuf,
    pub settings: Settings,
    pub password: Option<RedactedPassword>,
    pub executable: Option<PathBuf>,
    pub port: Option<u16>,
    pub json: bool,
}

impl Context {
    /// Load the settings file and capture the global flags.
    pub fn load(cli: &Cli) -> Result<Self, TorManagerError> {
        let settings_dir = match &cli.config_dir {
            Some(dir) => dir.clone(),
            None => Settings::default_dir()?,
        };
        let settings = Settings::load(&settings_dir)?;

        Ok(Self {
            settings_dir,
            settings,
            password: RedactedPassword::from_input(cli.password.clone()),
            executable: cli.executable.clone(),
            port: cli.port,
            json: cli.json,
        })
    }

    /// Runtime daemon configuration: settings, then command-line overrides.
    ///
    /// Without a configured executable, the first `tor` on `PATH` is used.
    pub fn daemon_config(&self) -> DaemonConfig {
        let mut config = DaemonConfig::from_settings(&self.settings, self.password.clone());

        if let Some(executable) = &self.executable {
            config.executable = executable.clone();
        } else if config.executable.as_os_str().is_empty()
            && let Some(found) = find_in_path(TOR_PROCESS_NAME)
        {
            debug!("Using {} from PATH", found.display());
            config.executable = found;
        }

        if let Some(port) = self.port {
            config.control_port = port;
        }

        config
    }
}

/// First `name` found in the directories of `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// A manager wired to a printer that shows its notifications.
pub fn manager_with_printer(context: &Context) -> (Arc<ControlManager>, NotificationPrinter) {
    let manager = Arc::new(ControlManager::new(context.daemon_config()));
    let printer = NotificationPrinter::spawn(manager.subscribe());
    (manager, printer)
}

/// Save `settings` and report where they went.
pub fn save_settings(settings: &Settings, dir: &Path) -> Result<(), TorManagerError> {
    settings.save(dir)?;
    println!("Settings saved to {}", dir.display());
    Ok(())
}

/// Dispatch the parsed command line.
pub async fn execute(cli: Cli) -> Result<(), TorManagerError> {
    let mut context = Context::load(&cli)?;

    match cli.command {
        Command::Run => session::run(&context).await,
        Command::Start => daemon::start(&context).await,
        Command::Discover { save } => daemon::discover(&mut context, save).await,
        Command::Send { discover, command } => {
            daemon::send(&context, discover, &command.join(" ")).await
        }
        Command::Status => daemon::status(&context).await,
        Command::Config { action } => config::execute(&mut context, action),
    }
}
