//! Error types for labsync-host

use labsync_exec::ExecError;
use thiserror::Error;

/// Errors raised by a host session
#[derive(Error, Debug, Clone)]
pub enum HostError {
    /// Transport failure (connect, auth, channel)
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Remote command exited non-zero
    #[error("command `{command}` failed on {host} (exit {status}): {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        status: i32,
        stderr: String,
    },

    /// A managed file could not be reconciled
    #[error("failed to reconcile {path}: {message}")]
    Reconcile { path: String, message: String },

    /// Host record cannot be turned into a session
    #[error("invalid host configuration for {host}: {message}")]
    Config { host: String, message: String },
}
