//! `clap` subcommands wiring the library into a binary: prompts, progress
//! bars, colored summaries.

mod install;
mod list;
mod remove;
mod update;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{Catalog, ConfigError, GlobalConfig};
use crate::orchestrator::Orchestrator;
use crate::progress::{ProgressReporter, TerminalReporter};

pub use install::{InstallArgs, install};
pub use list::list;
pub use remove::{RemoveArgs, remove};
pub use update::{UpdateArgs, update};

macro_rules! msg {
    ($label:expr, $($rest:tt)+) => {
        {
            use owo_colors::OwoColorize;
            eprintln!("{:>12} {}", $label.green().bold(), format_args!($($rest)+))
        }
    };
}
pub(crate) use msg;

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(code(my_unicorn::cli::interactive_prompt_failed))]
    Inquire(#[from] inquire::InquireError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Parser)]
#[command(name = "my-unicorn", version, about = "Install and update AppImage applications")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install one or more applications by catalog name or repository URL.
    Install(InstallArgs),
    /// Check for and apply updates to installed applications.
    Update(UpdateArgs),
    /// Uninstall an application.
    Remove(RemoveArgs),
    /// List installed applications.
    List,
}

/// Shared setup: loads global config + bundled catalog, ensures
/// directories exist, wires a cancellation token to Ctrl-C.
pub async fn bootstrap() -> Result<(GlobalConfig, Catalog, CancellationToken), CliError> {
    let config = GlobalConfig::load_or_default().await?;
    config.ensure_directories().await.map_err(|e| ConfigError::Io(e))?;
    let catalog = Catalog::load(&config.config_dir.join("catalog.json")).await?;

    let cancel_token = CancellationToken::new();
    tokio::spawn({
        let cancel_token = cancel_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel_token.cancel();
                eprintln!("Cancelled.");
            }
        }
    });

    Ok((config, catalog, cancel_token))
}

pub fn build_orchestrator(
    config: GlobalConfig,
    catalog: Catalog,
    reload_handle: Option<
        tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>,
    >,
) -> (Orchestrator, Arc<TerminalReporter>) {
    let reporter = Arc::new(TerminalReporter::new(reload_handle));
    let orchestrator = Orchestrator::new(config, catalog, reporter.clone() as Arc<dyn ProgressReporter>);
    (orchestrator, reporter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_parses_multiple_targets_and_flags() {
        let cli = Cli::try_parse_from([
            "my-unicorn",
            "install",
            "obsidian",
            "acme/widget",
            "--concurrency",
            "2",
            "--no-verify",
        ])
        .unwrap();

        match cli.command {
            Command::Install(args) => {
                assert_eq!(args.targets, vec!["obsidian", "acme/widget"]);
                assert_eq!(args.concurrency, Some(2));
                assert!(args.no_verify);
            }
            other => panic!("expected Install, got {other:?}"),
        }
    }

    #[test]
    fn install_requires_at_least_one_target() {
        assert!(Cli::try_parse_from(["my-unicorn", "install"]).is_err());
    }

    #[test]
    fn update_defaults_have_no_targets_and_all_flags_off() {
        let cli = Cli::try_parse_from(["my-unicorn", "update"]).unwrap();
        match cli.command {
            Command::Update(args) => {
                assert!(args.targets.is_empty());
                assert!(!args.check);
                assert!(!args.refresh_cache);
                assert!(!args.force);
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn remove_parses_app_name_and_force_flag() {
        let cli = Cli::try_parse_from(["my-unicorn", "remove", "obsidian", "--force"]).unwrap();
        match cli.command {
            Command::Remove(args) => {
                assert_eq!(args.app_name, "obsidian");
                assert!(args.force);
            }
            other => panic!("expected Remove, got {other:?}"),
        }
    }

    #[test]
    fn list_takes_no_arguments() {
        assert!(matches!(
            Cli::try_parse_from(["my-unicorn", "list"]).unwrap().command,
            Command::List
        ));
    }
}
