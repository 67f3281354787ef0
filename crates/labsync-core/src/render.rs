//! Per-instance rendering of exporter config templates

use std::collections::BTreeMap;

use labsync_api::{ExporterConfigTemplate, ExporterInstance, LabResource, ServiceParameters};
use labsync_template::{Parameters, TemplateApplier};

use crate::error::SyncError;
use crate::lab::LabResources;

/// Name of the parameter set built for each instance
pub const INSTANCE_PARAMETERS: &str = "exporter-instance";

/// Fully rendered copies of an instance and its config template
#[derive(Debug, Clone)]
pub struct RenderedInstance {
    pub instance: ExporterInstance,
    pub config: ExporterConfigTemplate,
}

impl RenderedInstance {
    /// Template labels overlaid by instance labels
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.config.spec.exporter_metadata.labels.clone();
        labels.extend(
            self.instance
                .metadata
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        labels
    }
}

/// Renders instances against the loaded record set
///
/// Every render works on owned copies; the records behind `resources` are
/// never modified.
pub struct InstanceRenderer<'a> {
    resources: &'a dyn LabResources,
    applier: &'a TemplateApplier,
}

impl<'a> InstanceRenderer<'a> {
    #[must_use]
    pub fn new(resources: &'a dyn LabResources, applier: &'a TemplateApplier) -> Self {
        Self { resources, applier }
    }

    /// Config template referenced by `instance`
    ///
    /// # Errors
    /// Returns `SyncError::TemplateNotFound` if it was not loaded
    pub fn config_template(
        &self,
        instance: &ExporterInstance,
    ) -> Result<&'a ExporterConfigTemplate, SyncError> {
        let template = &instance.spec.config_template_ref.name;
        self.resources
            .exporter_config_template(template)
            .ok_or_else(|| SyncError::TemplateNotFound {
                instance: instance.name().to_string(),
                template: template.clone(),
            })
    }

    /// Render `instance` and its config template
    ///
    /// The instance copy is rendered with variables only. Its
    /// `configTemplateRef.parameters`, the device's service parameters and
    /// the jumpstarter endpoint then become `$(param.*)` for the template,
    /// with `$(name)` bound to the instance name.
    ///
    /// # Errors
    /// Returns `SyncError::TemplateNotFound` or `SyncError::Render`
    pub fn render(
        &self,
        instance: &ExporterInstance,
        service: Option<&ServiceParameters>,
    ) -> Result<RenderedInstance, SyncError> {
        let template = self.config_template(instance)?;
        let render_error = |source| SyncError::Render {
            instance: instance.name().to_string(),
            source,
        };

        let mut instance_copy = instance.clone();
        self.applier
            .apply(&mut instance_copy)
            .map_err(render_error)?;

        let parameters = self.parameters(&instance_copy, service);
        let meta = Parameters::new("meta").with("name", instance_copy.name());

        let mut config = template.clone();
        self.applier
            .apply_with_parameters(&mut config, &parameters, Some(&meta))
            .map_err(render_error)?;

        Ok(RenderedInstance {
            instance: instance_copy,
            config,
        })
    }

    fn parameters(
        &self,
        instance: &ExporterInstance,
        service: Option<&ServiceParameters>,
    ) -> Parameters {
        let mut parameters = Parameters::new(INSTANCE_PARAMETERS);
        parameters.set_from_map(&instance.spec.config_template_ref.parameters);

        if let Some(service) = service {
            parameters.set("token", service.token.as_str());
            parameters.set("tlsCA", service.tls_ca.as_str());
        }

        let endpoint = self
            .resources
            .jumpstarter_instance(&instance.spec.jumpstarter_instance_ref.name)
            .and_then(|ji| ji.primary_endpoint());
        if let Some(endpoint) = endpoint {
            parameters.set("endpoint", endpoint);
        }
        parameters
    }
}
