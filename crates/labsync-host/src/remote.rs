//! Host session over a remote executor

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use labsync_api::{ExporterConfigTemplate, ExporterHost, LabResource};
use labsync_exec::{CommandResult, RemoteExecutor, SshExecutorBuilder};
use tracing::{debug, info, instrument};

use crate::bootc;
use crate::error::HostError;
use crate::files::{
    FILE_TIMEOUT, container_unit_path, decode_file_output, exporter_config_path, read_file_command,
    write_file_command,
};
use crate::sink::LogSink;
use crate::traits::HostSession;

/// Deadline for `systemctl` and `systemd-run` calls and quick checks
pub const SERVICE_TIMEOUT: Duration = Duration::from_secs(90);

/// [`HostSession`] that drives an exporter host through shell commands
pub struct RemoteHostSession {
    host: String,
    executor: Arc<dyn RemoteExecutor>,
    writer: Option<LogSink>,
}

impl std::fmt::Debug for RemoteHostSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHostSession")
            .field("host", &self.host)
            .field("executor", &self.executor.executor_type())
            .finish_non_exhaustive()
    }
}

impl RemoteHostSession {
    /// Wrap an executor already pointed at `host`
    pub fn new(host: impl Into<String>, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            host: host.into(),
            executor,
            writer: None,
        }
    }

    /// Build an SSH-backed session from a rendered exporter host record
    ///
    /// The target is `management.ssh.host`, falling back to the first address.
    ///
    /// # Errors
    /// Returns `HostError::Config` if there is no target address and
    /// `HostError::Exec` if credentials cannot be loaded
    pub fn for_exporter_host(host: &ExporterHost) -> Result<Self, HostError> {
        let ssh = &host.spec.management.ssh;
        let target = if ssh.host.is_empty() {
            host.spec.addresses.first().cloned().ok_or_else(|| HostError::Config {
                host: host.name().to_string(),
                message: "no management.ssh.host and no addresses".to_string(),
            })?
        } else {
            ssh.host.clone()
        };

        let passphrase = Some(ssh.ssh_key_password.clone()).filter(|p| !p.is_empty());
        let mut builder = SshExecutorBuilder::new(target, ssh.user.clone()).with_port(ssh.port);
        if !ssh.key_file.is_empty() {
            builder = builder.with_key_file(&ssh.key_file, passphrase.clone());
        }
        if !ssh.ssh_key_data.is_empty() {
            builder = builder.with_key_data(ssh.ssh_key_data.clone(), passphrase);
        }
        if !ssh.password.is_empty() {
            builder = builder.with_password(ssh.password.clone());
        }

        let executor = builder.build()?;
        Ok(Self::new(host.name(), Arc::new(executor)))
    }

    /// Name of the host this session talks to
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn log(&self, args: std::fmt::Arguments<'_>) {
        match &self.writer {
            Some(sink) => sink.write_fmt(args),
            None => info!(host = %self.host, "{}", args.to_string().trim_end()),
        }
    }

    async fn run_bounded(&self, cmd: &str, timeout: Duration) -> Result<CommandResult, HostError> {
        Ok(self.executor.run_with_timeout(cmd, timeout).await?)
    }

    async fn run_checked(&self, cmd: &str, timeout: Duration) -> Result<CommandResult, HostError> {
        let result = self.run_bounded(cmd, timeout).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(HostError::CommandFailed {
                host: self.host.clone(),
                command: cmd.to_string(),
                status: result.status,
                stderr: result.stderr.trim().to_string(),
            })
        }
    }

    async fn read_remote_file(&self, path: &str) -> Result<Option<Vec<u8>>, HostError> {
        let result = self
            .run_bounded(&read_file_command(path), FILE_TIMEOUT)
            .await?;
        match result.status {
            0 => decode_file_output(&result.stdout)
                .map(Some)
                .map_err(|e| HostError::Reconcile {
                    path: path.to_string(),
                    message: format!("unreadable file contents: {e}"),
                }),
            1 if result.stderr.trim().is_empty() => Ok(None),
            status => Err(HostError::Reconcile {
                path: path.to_string(),
                message: format!("read failed (exit {status}): {}", result.stderr.trim()),
            }),
        }
    }

    /// Make `path` hold exactly `content`; returns whether it differed
    #[instrument(skip(self, content), fields(host = %self.host))]
    async fn reconcile_file(
        &self,
        path: &str,
        content: &str,
        dry_run: bool,
    ) -> Result<bool, HostError> {
        let existing = self.read_remote_file(path).await?;

        match existing {
            Some(current) if current == content.as_bytes() => {
                debug!(path, "file up to date");
                return Ok(false);
            }
            Some(_) if dry_run => {
                self.log(format_args!("            ✏️ Would update file: {path}\n"));
                return Ok(true);
            }
            None if dry_run => {
                self.log(format_args!("            📄 Would create file: {path}\n"));
                return Ok(true);
            }
            _ => {}
        }

        self.run_checked(&write_file_command(path, content), FILE_TIMEOUT)
            .await
            .map_err(|e| HostError::Reconcile {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        if existing.is_some() {
            self.log(format_args!("            ✏️ Updated file: {path}\n"));
        } else {
            self.log(format_args!("            📄 Created file: {path}\n"));
        }
        Ok(true)
    }

    async fn restart_service(&self, service: &str) -> Result<(), HostError> {
        let unit = shell_words::quote(service);
        self.run_checked("systemctl daemon-reload", SERVICE_TIMEOUT)
            .await?;
        self.run_checked(&format!("systemctl start {unit}"), SERVICE_TIMEOUT)
            .await?;
        self.run_checked(&format!("systemctl restart {unit}"), SERVICE_TIMEOUT)
            .await?;
        self.log(format_args!("            🔄 Restarted service: {service}\n"));
        Ok(())
    }
}

#[async_trait]
impl HostSession for RemoteHostSession {
    #[instrument(skip(self), fields(host = %self.host))]
    async fn status(&self) -> Result<String, HostError> {
        self.executor.connect().await?;
        let result = self.run_bounded("true", SERVICE_TIMEOUT).await?;
        if result.success() {
            Ok("ok".to_string())
        } else {
            Ok(format!("error (exit code: {})", result.status))
        }
    }

    #[instrument(skip(self, config), fields(host = %self.host, service = %config.service_name()))]
    async fn apply(
        &self,
        config: &ExporterConfigTemplate,
        dry_run: bool,
    ) -> Result<bool, HostError> {
        let service = config.service_name();
        if service.is_empty() {
            return Err(HostError::Config {
                host: self.host.clone(),
                message: format!(
                    "config template {} renders an empty exporterMetadata.name",
                    config.name()
                ),
            });
        }

        let unit_changed = if config.spec.systemd_container_template.is_empty() {
            false
        } else {
            self.reconcile_file(
                &container_unit_path(service),
                &config.spec.systemd_container_template,
                dry_run,
            )
            .await?
        };

        let config_changed = self
            .reconcile_file(
                &exporter_config_path(service),
                &config.spec.config_template,
                dry_run,
            )
            .await?;

        let changed = unit_changed || config_changed;
        if changed && !dry_run {
            self.restart_service(service).await?;
        } else if changed {
            self.log(format_args!("            🔄 Would restart service: {service}\n"));
        }

        Ok(changed)
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn handle_bootc_upgrade(&self, dry_run: bool) -> Result<bool, HostError> {
        if !self
            .run_bounded(bootc::PROBE_COMMAND, SERVICE_TIMEOUT)
            .await?
            .success()
        {
            debug!("bootc not installed, skipping upgrade check");
            return Ok(false);
        }

        for unit in bootc::in_progress_units() {
            let state = self
                .run_bounded(&bootc::is_active_command(&unit), SERVICE_TIMEOUT)
                .await?;
            if bootc::is_active_state(&state.stdout) {
                self.log(format_args!(
                    "    ⏳ Bootc upgrade already in progress ({unit}), skipping\n"
                ));
                return Ok(false);
            }
        }

        let check = self
            .run_checked(bootc::CHECK_COMMAND, bootc::CHECK_TIMEOUT)
            .await?;
        if !bootc::update_available(&check.stdout) {
            debug!("no bootc update available");
            return Ok(false);
        }

        if dry_run {
            self.log(format_args!("    ⬆️  Bootc update available, would schedule upgrade\n"));
            return Ok(true);
        }

        self.run_checked(&bootc::schedule_command(), SERVICE_TIMEOUT)
            .await?;
        self.log(format_args!(
            "    ⬆️  Bootc upgrade scheduled in {}\n",
            bootc::UPGRADE_DELAY
        ));
        Ok(true)
    }

    async fn run_host_command(&self, cmd: &str) -> Result<CommandResult, HostError> {
        Ok(self.executor.run(cmd).await?)
    }

    async fn close(&self) -> Result<(), HostError> {
        Ok(self.executor.disconnect().await?)
    }

    fn set_writer(&mut self, sink: LogSink) {
        self.writer = Some(sink);
    }
}
