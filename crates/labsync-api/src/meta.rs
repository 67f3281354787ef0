//! Object metadata shared by every record kind

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use labsync_template::impl_templated;

/// Annotation marking an exporter instance as dead; its presence is what counts
pub const DEAD_ANNOTATION: &str = "dead";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl_templated!(ObjectMeta {
    name,
    namespace,
    labels,
    annotations
});

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Reference to another record by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    #[serde(default)]
    pub name: String,
}

impl_templated!(ObjectReference { name });

impl ObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Whether the reference names anything
    #[must_use]
    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Common accessors for top-level lab records
pub trait LabResource {
    /// Value expected in the `kind` field
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    /// Kind the record declared when decoded
    fn kind(&self) -> &str;

    fn name(&self) -> &str {
        &self.metadata().name
    }
}
