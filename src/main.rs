use clap::Parser;
use my_unicorn::cli::{Cli, Command};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

#[tokio::main]
async fn main() -> miette::Result<()> {
    if std::env::var_os("NO_COLOR").is_some() {
        owo_colors::set_override(false);
    }

    let (filter_layer, reload_handle) = reload::Layer::new(EnvFilter::from_default_env());
    Registry::default()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Install(args) => my_unicorn::cli::install(args, Some(reload_handle)).await,
        Command::Update(args) => my_unicorn::cli::update(args, Some(reload_handle)).await,
        Command::Remove(args) => my_unicorn::cli::remove(args).await,
        Command::List => my_unicorn::cli::list().await,
    };

    result.map_err(Into::into)
}
