use crate::cli::ConfigAction;
use crate::commands::{Context, save_settings};
use crate::error::TorManagerError;

use common::ErrorLocation;

use std::panic::Location;

pub fn execute(context: &mut Context, action: ConfigAction) -> Result<(), TorManagerError> {
    match action {
        ConfigAction::Show => show(context),
        ConfigAction::Set {
            executable_path,
            control_port,
            cookie_path,
            clear_cookie,
        } => {
            let daemon = &mut context.settings.daemon;
            if let Some(path) = executable_path {
                daemon.executable_path = Some(path);
            }
            if let Some(port) = control_port {
                daemon.control_port = port;
            }
            if let Some(path) = cookie_path {
                daemon.cookie_path = Some(path);
            }
            if clear_cookie {
                daemon.cookie_path = None;
            }

            save_settings(&context.settings, &context.settings_dir)
        }
    }
}

fn show(context: &Context) -> Result<(), TorManagerError> {
    let json = serde_json::to_string_pretty(&context.settings).map_err(|e| {
        TorManagerError::TorManager {
            message: format!("Failed to render settings: {e}"),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    println!("{json}");
    Ok(())
}
