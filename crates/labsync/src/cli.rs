//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::loader::DEFAULT_CONFIG_FILE;
use crate::settings::SETTINGS_ENV;

#[derive(Debug, Parser)]
#[command(name = "labsync")]
#[command(about = "Render and push jumpstarter lab exporter configuration", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Tool settings file
    #[arg(long, global = true, env = SETTINGS_ENV)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply configuration to the exporter hosts
    Apply(ApplyArgs),
    /// Validate configuration files
    Lint(LintArgs),
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Lab configuration file
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Show what would be applied without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Path to the vault password file for decrypting variables
    #[arg(long)]
    pub vault_password_file: Option<PathBuf>,

    /// Show rendered configs
    #[arg(long)]
    pub debug_configs: bool,

    /// Regexp pattern to filter exporters by name
    #[arg(long)]
    pub filter_exporters: Option<String>,

    /// Number of hosts to process in parallel (0 for sequential)
    #[arg(long)]
    pub parallel: Option<usize>,

    /// YAML mapping of "<instance>:<device>" to exporter credentials
    #[arg(long)]
    pub service_parameters: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct LintArgs {
    /// Lab configuration file
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Path to the vault password file for decrypting variables
    #[arg(long)]
    pub vault_password_file: Option<PathBuf>,
}
