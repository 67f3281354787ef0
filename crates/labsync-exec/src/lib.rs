//! labsync-exec: Remote execution abstraction
//!
//! Provides the [`RemoteExecutor`] trait and an SSH implementation used to
//! run commands on exporter hosts

pub mod error;
pub mod keys;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{AuthMethod, KeyError};
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::{SshExecutor, SshExecutorBuilder};
pub use traits::RemoteExecutor;
