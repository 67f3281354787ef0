//! Host session trait

use async_trait::async_trait;
use labsync_api::ExporterConfigTemplate;
use labsync_exec::CommandResult;

use crate::error::HostError;
use crate::sink::LogSink;

/// One open session to an exporter host
///
/// Sessions are used sequentially by a single worker; commands are never
/// issued concurrently on one session.
#[async_trait]
pub trait HostSession: Send + Sync {
    /// Check that the host answers commands
    async fn status(&self) -> Result<String, HostError>;

    /// Reconcile a rendered config template onto the host
    ///
    /// Returns whether anything changed (or would change, in dry-run).
    async fn apply(
        &self,
        config: &ExporterConfigTemplate,
        dry_run: bool,
    ) -> Result<bool, HostError>;

    /// Check for and schedule a bootc OS image upgrade
    ///
    /// Returns whether an upgrade was scheduled (or would be, in dry-run).
    async fn handle_bootc_upgrade(&self, dry_run: bool) -> Result<bool, HostError>;

    /// Run an arbitrary command, returning its output whatever the exit status
    async fn run_host_command(&self, cmd: &str) -> Result<CommandResult, HostError>;

    /// Close the underlying connection
    async fn close(&self) -> Result<(), HostError>;

    /// Redirect the session's own progress messages into `sink`
    fn set_writer(&mut self, sink: LogSink);
}
