use owo_colors::OwoColorize;

use super::{CliError, bootstrap};
use crate::config::state::StateManager;

pub async fn list() -> Result<(), CliError> {
    let (config, _catalog, _cancel_token) = bootstrap().await?;
    let state_manager = StateManager::new(config.state_dir());

    let names = state_manager
        .list()
        .await
        .map_err(|e| CliError::Config(crate::config::ConfigError::Io(std::io::Error::other(e.to_string()))))?;

    if names.is_empty() {
        println!("No applications installed.");
        return Ok(());
    }

    for name in names {
        match state_manager.load(&name).await {
            Ok(Some(state)) => {
                println!(
                    "{:<24} {} {}",
                    name.bold(),
                    state.installed_version.green(),
                    state.installed_path.display()
                );
            }
            _ => println!("{:<24} (state unreadable)", name.bold()),
        }
    }

    Ok(())
}
