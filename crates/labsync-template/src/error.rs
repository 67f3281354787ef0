//! Error types for labsync-template

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while decrypting an Ansible Vault payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// No vault password was configured
    #[error("no vault password available to decrypt value")]
    MissingPassword,

    /// Payload does not start with a recognised vault header
    #[error("invalid vault header: {0}")]
    InvalidHeader(String),

    /// Vault version or cipher not supported
    #[error("unsupported vault format: {0}")]
    Unsupported(String),

    /// Payload is structurally broken (bad hex, missing sections)
    #[error("malformed vault payload: {0}")]
    Malformed(String),

    /// HMAC check failed, usually a wrong password
    #[error("vault HMAC verification failed (wrong password?)")]
    IntegrityCheckFailed,

    /// Plaintext padding or encoding is invalid
    #[error("vault decryption produced invalid plaintext: {0}")]
    InvalidPlaintext(String),
}

/// Errors raised by the variable store
#[derive(Error, Debug, Clone)]
pub enum VarError {
    /// Variable key does not exist
    #[error("variable not found: {0}")]
    NotFound(String),

    /// Encrypted variable could not be decrypted
    #[error("failed to decrypt variable '{key}': {source}")]
    Vault {
        /// Variable key
        key: String,
        /// Underlying vault failure
        #[source]
        source: VaultError,
    },

    /// Variable value is a sequence or a mapping
    #[error("variable '{key}' in {path} is not a scalar value")]
    NotScalar {
        /// Variable key
        key: String,
        /// File the variable came from
        path: PathBuf,
    },

    /// Variable file could not be read
    #[error("error reading variables file {path}: {message}")]
    Io {
        /// File path
        path: PathBuf,
        /// I/O error text
        message: String,
    },

    /// Variable file is not a YAML mapping
    #[error("error parsing YAML from file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser error text
        message: String,
    },
}

/// Errors raised while resolving placeholders
#[derive(Error, Debug, Clone)]
pub enum TemplateError {
    /// Iteration limit hit while substituted values still contained placeholders
    #[error(
        "templating: recursion limit reached while applying replacements, check for circular references, like: {key} => {value}"
    )]
    CircularReference {
        /// Key whose value kept introducing placeholders
        key: String,
        /// Raw value of that key
        value: String,
    },

    /// Placeholders left after resolution
    #[error("templating: unhandled variables found: [{}]", .keys.join(", "))]
    Unresolved {
        /// Every key that could not be resolved
        keys: Vec<String>,
    },

    /// A variable in the store failed to produce a value
    #[error("templating: error retrieving variable '{key}': {source}")]
    Variable {
        /// Variable key
        key: String,
        /// Underlying store error
        #[source]
        source: VarError,
    },

    /// Resolution failed inside a mapping value
    #[error("template error for map key {key}: {source}")]
    MapEntry {
        /// Mapping key being resolved
        key: String,
        /// Underlying failure
        #[source]
        source: Box<TemplateError>,
    },
}
