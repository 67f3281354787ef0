//! labsync CLI

use clap::Parser;
use color_eyre::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use labsync::cli::{Cli, Commands};
use labsync::commands;
use labsync::settings::Settings;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let settings_path = Settings::discover(cli.settings.as_deref());
    let settings = match &settings_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    init_tracing(&settings.log_level);
    debug!(path = ?settings_path, "settings loaded");

    match &cli.command {
        Commands::Apply(args) => commands::apply(args, &settings).await,
        Commands::Lint(args) => commands::lint(args),
    }
}
