//! Loaded lab configuration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use labsync_api::{
    ExporterConfigTemplate, ExporterHost, ExporterInstance, JumpstarterInstance, LabResource,
    PhysicalLocation,
};
use labsync_template::Variables;

/// Read access to the decoded lab records
///
/// The engine only depends on this capability set, never on how the
/// records were loaded.
pub trait LabResources: Send + Sync {
    /// Every exporter host, ordered by name
    fn exporter_hosts(&self) -> Vec<&ExporterHost>;

    /// Instances whose `exporterHostRef` names `host`, ordered by name
    fn exporter_instances_for_host(&self, host: &str) -> Vec<&ExporterInstance>;

    fn exporter_config_template(&self, name: &str) -> Option<&ExporterConfigTemplate>;

    fn jumpstarter_instance(&self, name: &str) -> Option<&JumpstarterInstance>;

    fn variables(&self) -> &Arc<Variables>;
}

/// In-memory record set keyed by kind and name
#[derive(Debug, Clone, Default)]
pub struct LabConfig {
    pub physical_locations: BTreeMap<String, PhysicalLocation>,
    pub exporter_hosts: BTreeMap<String, ExporterHost>,
    pub exporter_instances: BTreeMap<String, ExporterInstance>,
    pub exporter_config_templates: BTreeMap<String, ExporterConfigTemplate>,
    pub jumpstarter_instances: BTreeMap<String, JumpstarterInstance>,
    pub variables: Arc<Variables>,
    /// Kind, then record name, to the file it was loaded from
    pub source_files: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

impl LabConfig {
    #[must_use]
    pub fn new(variables: Variables) -> Self {
        Self {
            variables: Arc::new(variables),
            ..Self::default()
        }
    }

    /// File a record was loaded from, if known
    #[must_use]
    pub fn source_file(&self, kind: &str, name: &str) -> Option<&PathBuf> {
        self.source_files.get(kind)?.get(name)
    }

    fn record_source<T: LabResource>(&mut self, record: &T, source: Option<PathBuf>) {
        if let Some(path) = source {
            self.source_files
                .entry(T::KIND.to_string())
                .or_default()
                .insert(record.name().to_string(), path);
        }
    }

    pub fn add_physical_location(&mut self, location: PhysicalLocation, source: Option<PathBuf>) {
        self.record_source(&location, source);
        self.physical_locations
            .insert(location.name().to_string(), location);
    }

    pub fn add_exporter_host(&mut self, host: ExporterHost, source: Option<PathBuf>) {
        self.record_source(&host, source);
        self.exporter_hosts.insert(host.name().to_string(), host);
    }

    pub fn add_exporter_instance(&mut self, instance: ExporterInstance, source: Option<PathBuf>) {
        self.record_source(&instance, source);
        self.exporter_instances
            .insert(instance.name().to_string(), instance);
    }

    pub fn add_exporter_config_template(
        &mut self,
        template: ExporterConfigTemplate,
        source: Option<PathBuf>,
    ) {
        self.record_source(&template, source);
        self.exporter_config_templates
            .insert(template.name().to_string(), template);
    }

    pub fn add_jumpstarter_instance(
        &mut self,
        instance: JumpstarterInstance,
        source: Option<PathBuf>,
    ) {
        self.record_source(&instance, source);
        self.jumpstarter_instances
            .insert(instance.name().to_string(), instance);
    }
}

impl LabResources for LabConfig {
    fn exporter_hosts(&self) -> Vec<&ExporterHost> {
        self.exporter_hosts.values().collect()
    }

    fn exporter_instances_for_host(&self, host: &str) -> Vec<&ExporterInstance> {
        self.exporter_instances
            .values()
            .filter(|instance| instance.spec.exporter_host_ref.name == host)
            .collect()
    }

    fn exporter_config_template(&self, name: &str) -> Option<&ExporterConfigTemplate> {
        self.exporter_config_templates.get(name)
    }

    fn jumpstarter_instance(&self, name: &str) -> Option<&JumpstarterInstance> {
        self.jumpstarter_instances.get(name)
    }

    fn variables(&self) -> &Arc<Variables> {
        &self.variables
    }
}
