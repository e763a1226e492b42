use tor_manager::cli::Cli;
use tor_manager::commands;
use tor_manager::logger::{default_log_dir, initialize as LoggerInitialize, level_for};

use control_core::error::render_chain;

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_dir = default_log_dir();
    if let Err(e) = LoggerInitialize(&log_dir, level_for(cli.verbose)) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    info!("tor-manager starting");
    info!("Log directory: {}", log_dir.display());

    match commands::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", render_chain(&e));
            ExitCode::FAILURE
        }
    }
}
