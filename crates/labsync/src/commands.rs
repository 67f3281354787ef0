//! `apply` and `lint` command handlers

use std::sync::Arc;
use std::time::Instant;

use eyre::{WrapErr, bail};
use labsync_core::{ExporterHostSyncer, LabConfig, SyncOptions};
use regex::Regex;
use tracing::info;

use crate::cli::{ApplyArgs, LintArgs};
use crate::factory::SshSessionFactory;
use crate::lint::validate_references;
use crate::loader::load_lab_config;
use crate::service::{dry_run_parameters, load_service_parameters};
use crate::settings::Settings;

fn load(config: &std::path::Path, vault_password_file: Option<&std::path::Path>) -> eyre::Result<LabConfig> {
    load_lab_config(config, vault_password_file)
        .wrap_err_with(|| format!("error loading config file {}", config.display()))
}

/// Validate references and report them on stdout
///
/// # Errors
/// Returns error if loading fails or any reference is broken
pub fn lint(args: &LintArgs) -> eyre::Result<()> {
    let lab = load(&args.config, args.vault_password_file.as_deref())?;

    println!("🔍 Validating configuration...");
    let start = Instant::now();
    let report = validate_references(&lab);
    let duration = start.elapsed();

    if !report.is_ok() {
        print!("{report}");
        println!("❌ Configuration validation failed in {duration:?}");
        bail!("configuration has {} reference error(s)", report.error_count());
    }

    println!("📚 Total Variables: {}\n", lab.variables.len());
    println!("✅ All configurations are valid");
    println!("✅ Configuration validation completed in {duration:?}");
    Ok(())
}

/// Render every exporter instance and push it to its host
///
/// # Errors
/// Returns error on load or lint failures, a bad filter, missing service
/// parameters, or a failed sync
pub async fn apply(args: &ApplyArgs, settings: &Settings) -> eyre::Result<()> {
    let lab = load(&args.config, args.vault_password_file.as_deref())?;

    let report = validate_references(&lab);
    if !report.is_ok() {
        print!("{report}");
        bail!("configuration has {} reference error(s)", report.error_count());
    }
    println!("📚 Total Variables: {}\n", lab.variables.len());
    println!("✅ All configurations are valid");

    let exporter_filter = args
        .filter_exporters
        .as_deref()
        .map(|pattern| {
            Regex::new(pattern)
                .wrap_err_with(|| format!("invalid exporter filter regexp '{pattern}'"))
        })
        .transpose()?;

    let options = SyncOptions {
        dry_run: args.dry_run,
        debug_configs: args.debug_configs || settings.sync.debug_configs,
        exporter_filter,
        parallelism: args.parallel.unwrap_or(settings.sync.parallel),
        retry: settings.retry.policy(),
    };

    let service_parameters = match (&args.service_parameters, args.dry_run) {
        (Some(path), _) => load_service_parameters(path)?,
        (None, true) => dry_run_parameters(&lab, &options),
        (None, false) => bail!("--service-parameters is required unless --dry-run is set"),
    };

    if args.dry_run {
        println!("Dry run: Would apply changes to:\n");
    } else {
        println!("Applying changes:\n");
    }
    info!(
        parallelism = options.parallelism,
        dry_run = options.dry_run,
        devices = service_parameters.len(),
        "starting apply"
    );

    let syncer = ExporterHostSyncer::new(
        Arc::new(lab),
        service_parameters,
        Arc::new(SshSessionFactory::new()),
        options,
    );
    syncer
        .sync_exporter_hosts()
        .await
        .wrap_err("error syncing exporter hosts")?;
    Ok(())
}
