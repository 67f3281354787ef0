//! Error types for the sync engine

use labsync_host::HostError;
use labsync_template::TemplateError;
use thiserror::Error;

/// Sync errors
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Instance references a config template that was not loaded
    #[error("exporter instance {instance}: config template {template} not found")]
    TemplateNotFound { instance: String, template: String },

    /// Control plane issued no credentials for this device
    #[error("service parameters not found for {key}")]
    ServiceParametersNotFound { key: String },

    /// Instance or its config template failed to render
    #[error("failed to render exporter instance {instance}: {source}")]
    Render {
        instance: String,
        #[source]
        source: TemplateError,
    },

    /// Exporter host record failed to render; aborts the run
    #[error("failed to render exporter host {host}: {source}")]
    HostTemplate {
        host: String,
        #[source]
        source: TemplateError,
    },

    /// Session could not be opened or its status check failed
    #[error("failed to connect to {host}: {source}")]
    Connection {
        host: String,
        #[source]
        source: HostError,
    },

    /// Remote apply failed for an instance
    #[error("failed to apply {instance}: {source}")]
    Apply {
        instance: String,
        #[source]
        source: HostError,
    },

    /// Bootc upgrade handling failed
    #[error("bootc upgrade failed on {host}: {source}")]
    Upgrade {
        host: String,
        #[source]
        source: HostError,
    },

    /// Host worker task panicked or was cancelled before reporting
    #[error("worker for {host} did not finish: {message}")]
    WorkerAborted { host: String, message: String },

    /// Items that ran out of retry attempts, as "what on host: last error"
    #[error("failed to process exporter instances after retries: {}", .failures.join("; "))]
    RetriesExhausted { failures: Vec<String> },
}

