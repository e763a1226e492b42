//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Environment variable holding the control password.
pub const PASSWORD_ENV_VAR: &str = "TOR_MANAGER_CONTROL_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "tor-manager", about = "Launch, discover and control a Tor daemon", version)]
pub struct Cli {
    /// Directory holding config.json (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Control password; never written to the settings file
    #[arg(long, global = true, env = PASSWORD_ENV_VAR, hide_env_values = true)]
    pub password: Option<String>,

    /// Override the configured tor executable
    #[arg(long, global = true)]
    pub executable: Option<PathBuf>,

    /// Override the configured control port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Print machine-readable JSON where a command has a report
    #[arg(long, global = true)]
    pub json: bool,

    /// Log at trace level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start or find Tor, connect, and read control commands from stdin
    Run,

    /// Launch Tor in the foreground until Ctrl-C
    Start,

    /// Inspect a running Tor process and report its control port and cookie
    Discover {
        /// Store the confirmed port and cookie path in the settings file
        #[arg(long)]
        save: bool,
    },

    /// Send one control command and print the raw reply
    Send {
        /// Run discovery first to pick up the daemon's real port and cookie
        #[arg(long)]
        discover: bool,

        /// The command, e.g. `GETINFO version`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show whether Tor is running and how the manager would connect
    Status,

    /// Show or change the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the settings file
    Show,

    /// Change settings fields and save
    Set {
        #[arg(long = "tor-path")]
        executable_path: Option<PathBuf>,

        #[arg(long = "control-port")]
        control_port: Option<u16>,

        #[arg(long = "cookie-path", conflicts_with = "clear_cookie")]
        cookie_path: Option<PathBuf>,

        /// Forget the stored cookie path
        #[arg(long)]
        clear_cookie: bool,
    },
}
