//! Remote executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs shell commands on a single remote host
///
/// Implementations are used sequentially; callers never issue concurrent
/// commands on one executor.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command, returning its output whatever the exit status
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command with a deadline
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Establish the connection ahead of the first command
    async fn connect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Close the connection; later commands reconnect
    async fn disconnect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Whether a connection is currently established
    fn is_connected(&self) -> bool {
        true
    }

    fn executor_type(&self) -> &'static str;
}
