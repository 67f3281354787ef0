//! Lab record kinds

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use labsync_template::impl_templated;

use crate::meta::{DEAD_ANNOTATION, LabResource, ObjectMeta, ObjectReference};

/// API version written by the lab configuration tooling
pub const API_VERSION: &str = "meta.jumpstarter.dev/v1alpha1";

macro_rules! lab_resource {
    ($ty:ident, $spec:ident, $kind:literal) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $ty {
            #[serde(default)]
            pub api_version: String,
            #[serde(default)]
            pub kind: String,
            #[serde(default)]
            pub metadata: ObjectMeta,
            #[serde(default)]
            pub spec: $spec,
        }

        impl LabResource for $ty {
            const KIND: &'static str = $kind;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn kind(&self) -> &str {
                &self.kind
            }
        }

        impl_templated!($ty {
            api_version,
            kind,
            metadata,
            spec
        });

        impl $ty {
            /// Create a record with the standard api version and kind
            pub fn new(name: impl Into<String>, spec: $spec) -> Self {
                Self {
                    api_version: API_VERSION.to_string(),
                    kind: $kind.to_string(),
                    metadata: ObjectMeta::named(name),
                    spec,
                }
            }
        }
    };
}

// Physical location

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl_templated!(Contact { name, email, phone });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalLocationSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl_templated!(PhysicalLocationSpec {
    description,
    address,
    contacts
});

lab_resource!(PhysicalLocation, PhysicalLocationSpec, "PhysicalLocation");

// Exporter host

/// SSH access to an exporter host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshCredentials {
    #[serde(default)]
    pub host: String,
    /// 0 means the default SSH port
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub key_file: String,
    #[serde(default)]
    pub ssh_key_data: String,
    #[serde(default)]
    pub ssh_key_password: String,
}

impl_templated!(SshCredentials {
    host,
    user,
    password,
    key_file,
    ssh_key_data,
    ssh_key_password
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Management {
    #[serde(default)]
    pub ssh: SshCredentials,
}

impl_templated!(Management { ssh });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExporterHostSpec {
    #[serde(default)]
    pub location_ref: ObjectReference,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub management: Management,
}

impl_templated!(ExporterHostSpec {
    location_ref,
    addresses,
    management
});

lab_resource!(ExporterHost, ExporterHostSpec, "ExporterHost");

// Exporter instance

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTemplateRef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl_templated!(ConfigTemplateRef { name, parameters });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExporterInstanceSpec {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub dut_location_ref: ObjectReference,
    #[serde(default)]
    pub exporter_host_ref: ObjectReference,
    #[serde(default)]
    pub jumpstarter_instance_ref: ObjectReference,
    #[serde(default)]
    pub config_template_ref: ConfigTemplateRef,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: String,
}

impl_templated!(ExporterInstanceSpec {
    username,
    dut_location_ref,
    exporter_host_ref,
    jumpstarter_instance_ref,
    config_template_ref,
    labels,
    notes
});

lab_resource!(ExporterInstance, ExporterInstanceSpec, "ExporterInstance");

impl ExporterInstance {
    /// Value of the dead annotation, if the instance carries one
    ///
    /// Any value counts, including an empty string or `"false"`.
    #[must_use]
    pub fn dead_reason(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(DEAD_ANNOTATION)
            .map(String::as_str)
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead_reason().is_some()
    }
}

// Exporter config template

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl_templated!(ExporterMetadata { name, labels });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExporterConfigTemplateSpec {
    #[serde(default)]
    pub exporter_metadata: ExporterMetadata,
    #[serde(default)]
    pub config_template: String,
    #[serde(default)]
    pub systemd_container_template: String,
    #[serde(default)]
    pub systemd_service_template: String,
}

impl_templated!(ExporterConfigTemplateSpec {
    exporter_metadata,
    config_template,
    systemd_container_template,
    systemd_service_template
});

lab_resource!(
    ExporterConfigTemplate,
    ExporterConfigTemplateSpec,
    "ExporterConfigTemplate"
);

impl ExporterConfigTemplate {
    /// Systemd service name the rendered template installs
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.spec.exporter_metadata.name
    }
}

// Jumpstarter instance

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumpstarterInstanceSpec {
    #[serde(default)]
    pub kube_context: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub kubeconfig: String,
}

impl_templated!(JumpstarterInstanceSpec {
    kube_context,
    namespace,
    endpoints,
    kubeconfig
});

lab_resource!(
    JumpstarterInstance,
    JumpstarterInstanceSpec,
    "JumpstarterInstance"
);

impl JumpstarterInstance {
    /// First advertised gRPC endpoint
    #[must_use]
    pub fn primary_endpoint(&self) -> Option<&str> {
        self.spec.endpoints.first().map(String::as_str)
    }
}
