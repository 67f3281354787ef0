//! Cross-reference validation of a loaded lab configuration

use std::collections::BTreeMap;
use std::fmt;

use labsync_api::{ExporterHost, ExporterInstance, LabResource};
use labsync_core::LabConfig;

/// Reference errors grouped by the file that declared the broken record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub errors_by_file: BTreeMap<String, Vec<String>>,
}

impl LintReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors_by_file.is_empty()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors_by_file.values().map(Vec::len).sum()
    }

    fn add(&mut self, file: String, message: String) {
        self.errors_by_file.entry(file).or_default().push(message);
    }
}

impl fmt::Display for LintReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n❌ Validation failed with {} error(s):\n", self.error_count())?;
        for (file, errors) in &self.errors_by_file {
            writeln!(f, "📄 {file}:")?;
            for error in errors {
                writeln!(f, "\t🔹 {error}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Check that every reference names a loaded record
///
/// Empty references are not errors.
#[must_use]
pub fn validate_references(lab: &LabConfig) -> LintReport {
    let mut report = LintReport::default();
    let source = |kind: &str, name: &str| {
        lab.source_file(kind, name)
            .map_or_else(|| "unknown".to_string(), |p| p.display().to_string())
    };

    for (name, host) in &lab.exporter_hosts {
        let location = &host.spec.location_ref;
        if location.is_set() && !lab.physical_locations.contains_key(&location.name) {
            report.add(
                source(ExporterHost::KIND, name),
                format!(
                    "ExporterHost {name} references non-existent location {}",
                    location.name
                ),
            );
        }
    }

    for (name, instance) in &lab.exporter_instances {
        let file = source(ExporterInstance::KIND, name);
        let spec = &instance.spec;

        let checks = [
            (
                &spec.dut_location_ref.name,
                "DUT location",
                lab.physical_locations.contains_key(&spec.dut_location_ref.name),
            ),
            (
                &spec.exporter_host_ref.name,
                "exporter host",
                lab.exporter_hosts.contains_key(&spec.exporter_host_ref.name),
            ),
            (
                &spec.jumpstarter_instance_ref.name,
                "jumpstarter instance",
                lab.jumpstarter_instances
                    .contains_key(&spec.jumpstarter_instance_ref.name),
            ),
            (
                &spec.config_template_ref.name,
                "config template",
                lab.exporter_config_templates
                    .contains_key(&spec.config_template_ref.name),
            ),
        ];

        for (target, what, exists) in checks {
            if !target.is_empty() && !exists {
                report.add(
                    file.clone(),
                    format!("ExporterInstance {name} references non-existent {what} {target}"),
                );
            }
        }
    }

    report
}
