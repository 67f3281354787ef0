//! Service parameter sources for the sync engine

use std::collections::HashMap;
use std::path::Path;

use eyre::WrapErr;
use labsync_api::{LabResource, ServiceParameters, service_parameters_key};
use labsync_core::{LabConfig, SyncOptions};

/// Token handed to every device in dry-run mode
pub const DRY_RUN_TOKEN: &str = "dry-run";

/// Read a `"<instance>:<device>" -> {token, tlsCA}` mapping
///
/// # Errors
/// Returns error if the file cannot be read or is not such a mapping
pub fn load_service_parameters(path: &Path) -> eyre::Result<HashMap<String, ServiceParameters>> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("error reading service parameters {}", path.display()))?;
    serde_yaml::from_str(&content)
        .wrap_err_with(|| format!("error parsing service parameters {}", path.display()))
}

/// Placeholder credentials for every selected device
#[must_use]
pub fn dry_run_parameters(
    lab: &LabConfig,
    options: &SyncOptions,
) -> HashMap<String, ServiceParameters> {
    lab.exporter_instances
        .values()
        .filter(|instance| options.matches(instance.name()))
        .map(|instance| {
            (
                service_parameters_key(&instance.spec.jumpstarter_instance_ref.name, instance.name()),
                ServiceParameters::new(DRY_RUN_TOKEN),
            )
        })
        .collect()
}
