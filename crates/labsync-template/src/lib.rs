//! labsync-template: variables, vault secrets and placeholder resolution
//!
//! This crate provides:
//! - [`Variables`]: YAML-backed variable store with Ansible Vault values
//! - [`Parameters`]: call-scoped parameter sets
//! - [`process_template`] / [`Resolver`]: `$(var.X)`, `$(param.X)`, `$(X)` substitution
//! - [`Templated`] / [`TemplateApplier`]: in-place resolution over typed records

pub mod apply;
pub mod error;
pub mod params;
pub mod resolve;
pub mod vault;
pub mod vars;

pub use apply::{TemplateApplier, Templated};
pub use error::{TemplateError, VarError, VaultError};
pub use params::Parameters;
pub use resolve::{Resolver, needs_replacements, process_template};
pub use vault::{VaultDecryptor, is_vault_payload};
pub use vars::{VAULT_PASSWORD_FILE_ENV, Variables};
