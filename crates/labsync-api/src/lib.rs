//! labsync-api: Typed lab configuration records
//!
//! Kubernetes-style records (`apiVersion`, `kind`, `metadata`, `spec`) for
//! locations, exporter hosts, exporter instances, exporter config templates
//! and jumpstarter instances, plus the per-device service parameters.

pub mod meta;
pub mod resources;
pub mod service;

pub use meta::{DEAD_ANNOTATION, LabResource, ObjectMeta, ObjectReference};
pub use resources::*;
pub use service::{ServiceParameters, service_parameters_key};
