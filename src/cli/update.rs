use clap::Args;
use owo_colors::OwoColorize;

use super::{CliError, bootstrap, build_orchestrator, msg};
use crate::orchestrator::UpdateOptions;

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Specific apps to check/update; defaults to every installed app.
    pub targets: Vec<String>,
    /// Only report available updates, do not install them.
    #[arg(long)]
    pub check: bool,
    /// Bypass the release cache and re-query the forge.
    #[arg(long)]
    pub refresh_cache: bool,
    /// Proceed even if no app reports an update (no-op for most callers).
    #[arg(long)]
    pub force: bool,
}

pub async fn update(
    args: UpdateArgs,
    reload_handle: Option<
        tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>,
    >,
) -> Result<(), CliError> {
    let (config, catalog, cancel_token) = bootstrap().await?;
    let (orchestrator, reporter) = build_orchestrator(config, catalog, reload_handle);

    let targets = (!args.targets.is_empty()).then_some(args.targets);
    reporter.start_session(None);
    let options = UpdateOptions {
        refresh_cache: args.refresh_cache,
        force: args.force,
        check_only: args.check,
    };
    let summary = orchestrator
        .update(targets, options, cancel_token)
        .await
        .map_err(|e| CliError::Config(crate::config::ConfigError::Io(std::io::Error::other(e.to_string()))))?;
    reporter.stop_session();

    for info in &summary.update_infos {
        if let Some(reason) = &info.error_reason {
            msg!("Error", "{}: {}", info.app_name.bold(), reason.red());
        } else if info.has_update {
            msg!(
                "Update",
                "{} {} -> {}",
                info.app_name.bold(),
                info.current_version,
                info.latest_version.green()
            );
        } else {
            msg!("Current", "{} ({})", info.app_name.bold(), info.current_version);
        }
    }

    if !args.check {
        for result in &summary.updated {
            match result.asset_bytes {
                Some(bytes) => msg!(
                    "Updated",
                    "{} ({})",
                    result.name.as_deref().unwrap_or(&result.target).bold(),
                    humansize::format_size(bytes, humansize::DECIMAL)
                ),
                None => msg!("Updated", "{}", result.name.as_deref().unwrap_or(&result.target).bold()),
            }
        }
        for result in &summary.failed {
            msg!(
                "Failed",
                "{}: {}",
                result.target.bold(),
                result.error_reason.as_deref().unwrap_or("unknown error").red()
            );
        }
    }

    for name in &summary.invalid_apps {
        msg!("Unknown", "{} is not installed", name.bold());
    }

    if summary.exit_code() != 0 {
        std::process::exit(summary.exit_code());
    }

    Ok(())
}
