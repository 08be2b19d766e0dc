use clap::Args;
use owo_colors::OwoColorize;

use super::{CliError, bootstrap, build_orchestrator, msg};
use crate::orchestrator::InstallOptions;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Catalog names or `owner/repo` URLs to install.
    #[arg(required = true)]
    pub targets: Vec<String>,
    /// Maximum number of apps to download/process concurrently.
    #[arg(long, short)]
    pub concurrency: Option<usize>,
    /// Skip checksum/digest verification.
    #[arg(long)]
    pub no_verify: bool,
}

pub async fn install(
    args: InstallArgs,
    reload_handle: Option<
        tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>,
    >,
) -> Result<(), CliError> {
    let (config, catalog, cancel_token) = bootstrap().await?;
    let (orchestrator, reporter) = build_orchestrator(config, catalog, reload_handle);

    reporter.start_session(Some(args.targets.len() as u64));
    let options = InstallOptions {
        concurrent: args.concurrency,
        verify_downloads: !args.no_verify,
        no_desktop: false,
    };
    let summary = orchestrator.install(args.targets, options, cancel_token).await;
    reporter.stop_session();

    for result in &summary.results {
        if result.success {
            match result.asset_bytes {
                Some(bytes) => msg!(
                    "Installed",
                    "{} ({})",
                    result.name.as_deref().unwrap_or(&result.target).bold(),
                    humansize::format_size(bytes, humansize::DECIMAL)
                ),
                None => msg!("Installed", "{}", result.name.as_deref().unwrap_or(&result.target).bold()),
            }
        } else {
            msg!(
                "Failed",
                "{}: {}",
                result.target.bold(),
                result.error_reason.as_deref().unwrap_or("unknown error").red()
            );
        }
    }

    if summary.exit_code() != 0 {
        std::process::exit(summary.exit_code());
    }

    Ok(())
}
