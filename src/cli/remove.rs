use clap::Args;
use inquire::Confirm;
use owo_colors::OwoColorize;

use super::{CliError, bootstrap, msg};
use crate::config::state::StateManager;

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Name of the installed application to remove.
    pub app_name: String,
    /// Skip the confirmation prompt.
    #[arg(long, short)]
    pub force: bool,
}

pub async fn remove(args: RemoveArgs) -> Result<(), CliError> {
    let (config, _catalog, _cancel_token) = bootstrap().await?;
    let state_manager = StateManager::new(config.state_dir());

    let Some(state) = state_manager.load(&args.app_name).await.map_err(|_| CliError::Config(crate::config::ConfigError::Io(
        std::io::Error::other("failed to read installed app state"),
    )))? else {
        msg!("Skipping", "{} is not installed", args.app_name.bold());
        return Ok(());
    };

    if !args.force {
        let confirmation = Confirm::new(&format!("Remove {}?", args.app_name))
            .with_default(false)
            .prompt()?;
        if !confirmation {
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    if state.installed_path.exists() {
        let _ = crate::fs::remove_file(&state.installed_path).await;
    }
    if let Some(icon_path) = &state.icon.path {
        let _ = crate::fs::remove_file(icon_path).await;
    }
    let desktop_file = config.desktop_dir.join(format!("{}.desktop", crate::sanitize_filename(&args.app_name)));
    let _ = crate::fs::remove_file(&desktop_file).await;

    let _ = state_manager.delete(&args.app_name).await;

    msg!("Removed", "{}", args.app_name.bold());
    Ok(())
}
