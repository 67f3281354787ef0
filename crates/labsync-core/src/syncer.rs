//! Exporter host synchronization engine

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use labsync_api::{ExporterHost, ExporterInstance, LabResource, ServiceParameters, service_parameters_key};
use labsync_host::{HostError, HostSession};
use labsync_template::TemplateApplier;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncOptions;
use crate::error::SyncError;
use crate::filter::select_instances;
use crate::lab::LabResources;
use crate::output::{OutputBuffer, SyncPrinter, SyncStats};
use crate::render::{InstanceRenderer, RenderedInstance};
use crate::retry::{RetryItem, RetryTarget, group_by_host};

/// Opens sessions to exporter hosts
///
/// Allows the engine to run against SSH hosts or test doubles.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a session for a rendered host record
    async fn open(&self, host: &ExporterHost) -> Result<Box<dyn HostSession>, HostError>;
}

/// Work for one host in the first pass
struct HostWork {
    host: Arc<ExporterHost>,
    address: String,
    alive: Vec<ExporterInstance>,
    dead: Vec<(String, String)>,
}

/// What a first-pass worker was handed, kept in case it never reports back
struct PendingHost {
    host: Arc<ExporterHost>,
    address: String,
    alive: Vec<ExporterInstance>,
}

/// Pushes rendered exporter configuration to every exporter host
///
/// Hosts are processed by a bounded pool of tasks, each writing into its own
/// [`OutputBuffer`]. Failures are retried with backoff once the first pass
/// has finished.
#[derive(Clone)]
pub struct ExporterHostSyncer {
    resources: Arc<dyn LabResources>,
    applier: Arc<TemplateApplier>,
    service_parameters: Arc<HashMap<String, ServiceParameters>>,
    factory: Arc<dyn SessionFactory>,
    options: Arc<SyncOptions>,
    printer: Arc<SyncPrinter>,
}

impl std::fmt::Debug for ExporterHostSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterHostSyncer")
            .field("options", &self.options)
            .field("service_parameters", &self.service_parameters.len())
            .finish_non_exhaustive()
    }
}

impl ExporterHostSyncer {
    #[must_use]
    pub fn new(
        resources: Arc<dyn LabResources>,
        service_parameters: HashMap<String, ServiceParameters>,
        factory: Arc<dyn SessionFactory>,
        options: SyncOptions,
    ) -> Self {
        let applier = TemplateApplier::new(Arc::clone(resources.variables()), None);
        Self {
            resources,
            applier: Arc::new(applier),
            service_parameters: Arc::new(service_parameters),
            factory,
            options: Arc::new(options),
            printer: Arc::new(SyncPrinter::new()),
        }
    }

    /// Replace the stdout printer
    #[must_use]
    pub fn with_printer(mut self, printer: Arc<SyncPrinter>) -> Self {
        self.printer = printer;
        self
    }

    #[must_use]
    pub fn printer(&self) -> &Arc<SyncPrinter> {
        &self.printer
    }

    /// Sync every exporter host, then drain the retry queue
    ///
    /// The summary is printed even when the run fails.
    ///
    /// # Errors
    /// Returns `SyncError::HostTemplate` if a host record cannot be rendered
    /// and `SyncError::RetriesExhausted` if any item ran out of attempts
    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn sync_exporter_hosts(&self) -> Result<SyncStats, SyncError> {
        self.printer
            .print("\n🔄 Syncing exporter hosts via SSH ===========================\n");

        let work = self.plan()?;
        info!(hosts = work.len(), "starting exporter host sync");

        let retry_queue = self.run_first_pass(work).await;

        let result = if retry_queue.is_empty() {
            Ok(())
        } else {
            self.printer.print(&format!(
                "\n🔄 Processing retry queue ({} failed items) ===========================\n",
                retry_queue.len()
            ));
            let queued = retry_queue.len();
            let (succeeded, result) = self.process_retry_queue(retry_queue).await;
            self.printer.add_retry_stats(queued, succeeded);
            result
        };

        self.printer.print_summary();
        result.map(|()| self.printer.stats())
    }

    /// Select instances and render host records
    fn plan(&self) -> Result<Vec<HostWork>, SyncError> {
        let mut work = Vec::new();

        for host in self.resources.exporter_hosts() {
            let instances = self
                .resources
                .exporter_instances_for_host(host.name())
                .into_iter()
                .cloned();
            let selection = select_instances(instances, &self.options);
            if selection.is_skipped() {
                if let Some(message) = selection.skip_message(host.name()) {
                    self.printer.print(&message);
                }
                debug!(host = %host.name(), "no alive instances, skipping host");
                continue;
            }

            let mut rendered = host.clone();
            self.applier
                .apply(&mut rendered)
                .map_err(|source| SyncError::HostTemplate {
                    host: host.name().to_string(),
                    source,
                })?;

            let Some(address) = rendered.spec.addresses.first().cloned() else {
                self.printer
                    .print(&format!("    ❌ Skipping {} - no addresses\n", host.name()));
                continue;
            };

            work.push(HostWork {
                host: Arc::new(rendered),
                address,
                alive: selection.alive,
                dead: selection.dead,
            });
        }

        Ok(work)
    }

    async fn run_first_pass(&self, work: Vec<HostWork>) -> Vec<RetryItem> {
        let permits = Arc::new(Semaphore::new(self.options.worker_limit()));
        let mut handles: Vec<(PendingHost, JoinHandle<Vec<RetryItem>>)> = Vec::new();

        for host_work in work {
            let syncer = self.clone();
            let permits = Arc::clone(&permits);
            let pending = PendingHost {
                host: Arc::clone(&host_work.host),
                address: host_work.address.clone(),
                alive: host_work.alive.clone(),
            };

            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let mut out = syncer.process_host(host_work).await;
                syncer.printer.flush_buffer(&out);
                out.take_retry_items()
            });
            handles.push((pending, handle));
        }

        let mut queue = Vec::new();
        for (pending, handle) in handles {
            match handle.await {
                Ok(items) => queue.extend(items),
                Err(e) => {
                    error!(host = %pending.host.name(), error = %e, "host worker panicked");
                    let mut out = aborted_host(pending, &e);
                    self.printer.flush_buffer(&out);
                    queue.extend(out.take_retry_items());
                }
            }
        }
        queue
    }

    /// Connect, apply every alive instance, then handle bootc upgrades
    #[instrument(skip_all, fields(host = %work.host.name()))]
    async fn process_host(&self, work: HostWork) -> OutputBuffer {
        let HostWork {
            host,
            address,
            alive,
            dead,
        } = work;
        let mut out = OutputBuffer::new(host.name(), alive.len());

        writeln!(out, "\n💻  Exporter host: {} ({address})", host.name());
        for (name, reason) in &dead {
            writeln!(out, "    📟 Exporter instance: {name} skipped - dead: {reason}");
        }

        let session = match self.connect(&host, &out).await {
            Ok(session) => session,
            Err(e) => {
                writeln!(out, "    ❌ Failed to create/test SSH connection: {e}");
                out.mark_error();
                queue_whole_host(&mut out, &host, alive, &e);
                out.finish();
                return out;
            }
        };

        for instance in alive {
            match self.process_instance(&instance, session.as_ref(), &out).await {
                Ok(true) => out.mark_changed(),
                Ok(false) => {}
                Err(e) => {
                    writeln!(out, "    ❌ Failed to process {}: {e}", instance.name());
                    out.mark_error();
                    out.add_retry_item(RetryItem::new(
                        RetryTarget::Device(Box::new(instance)),
                        Arc::clone(&host),
                        e,
                    ));
                }
            }
        }

        match self.upgrade(&host, session.as_ref()).await {
            Ok(true) => out.mark_changed(),
            Ok(false) => {}
            Err(e) => {
                writeln!(out, "    ⚠️  Bootc upgrade error: {e}");
                out.mark_error();
                out.add_retry_item(RetryItem::new(RetryTarget::Upgrade, Arc::clone(&host), e));
            }
        }

        close_session(&host, session.as_ref()).await;
        out.finish();
        out
    }

    /// Open a session logging into `out` and check that it answers
    async fn connect(
        &self,
        host: &ExporterHost,
        out: &OutputBuffer,
    ) -> Result<Box<dyn HostSession>, SyncError> {
        let connection_error = |source| SyncError::Connection {
            host: host.name().to_string(),
            source,
        };

        let mut session = self.factory.open(host).await.map_err(connection_error)?;
        session.set_writer(out.sink());
        match session.status().await {
            Ok(status) => {
                debug!(host = %host.name(), status = %status, "session ready");
                Ok(session)
            }
            Err(e) => {
                close_session(host, session.as_ref()).await;
                Err(connection_error(e))
            }
        }
    }

    async fn upgrade(&self, host: &ExporterHost, session: &dyn HostSession) -> Result<bool, SyncError> {
        session
            .handle_bootc_upgrade(self.options.dry_run)
            .await
            .map_err(|source| SyncError::Upgrade {
                host: host.name().to_string(),
                source,
            })
    }

    /// Render one instance and apply it; returns whether the host changed
    async fn process_instance(
        &self,
        instance: &ExporterInstance,
        session: &dyn HostSession,
        out: &OutputBuffer,
    ) -> Result<bool, SyncError> {
        writeln!(out, "    📟 Exporter instance: {}", instance.name());

        let renderer = InstanceRenderer::new(self.resources.as_ref(), &self.applier);
        renderer.config_template(instance)?;

        let key = service_parameters_key(
            &instance.spec.jumpstarter_instance_ref.name,
            instance.name(),
        );
        let service = self
            .service_parameters
            .get(&key)
            .ok_or(SyncError::ServiceParametersNotFound { key })?;

        let rendered = renderer.render(instance, Some(service))?;
        if self.options.debug_configs {
            dump_rendered(out, &rendered);
        }

        session
            .apply(&rendered.config, self.options.dry_run)
            .await
            .map_err(|source| SyncError::Apply {
                instance: instance.name().to_string(),
                source,
            })
    }

    /// Retry rounds until every item succeeded or expired
    ///
    /// Returns the number of items that eventually succeeded.
    async fn process_retry_queue(&self, mut queue: Vec<RetryItem>) -> (usize, Result<(), SyncError>) {
        let policy = self.options.retry;
        let mut succeeded = 0;
        let mut failures = Vec::new();

        while !queue.is_empty() {
            let partition = policy.partition(queue, Instant::now());

            for item in partition.expired {
                warn!(
                    host = %item.host_name,
                    item = %item.description(),
                    attempts = item.attempts,
                    error = %item.last_error,
                    "giving up after max retry attempts"
                );
                self.printer.print(&format!(
                    "💀 Max retry attempts exceeded for {} on {}, giving up: {}\n",
                    item.description(),
                    item.host_name,
                    item.last_error
                ));
                failures.push(item.failure_summary());
            }

            let mut next = partition.waiting;
            let (round_succeeded, requeued) = self.run_retry_round(partition.ready).await;
            succeeded += round_succeeded;
            next.extend(requeued);
            queue = next;

            if let Some(wait) = policy.next_wait(&queue, Instant::now()) {
                self.printer.print(&format!(
                    "⏳ Waiting {}s before next retry cycle...\n",
                    wait.as_secs()
                ));
                tokio::time::sleep(wait).await;
            }
        }

        let result = if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::RetriesExhausted { failures })
        };
        (succeeded, result)
    }

    /// Retry ready items, one task and one session per host
    async fn run_retry_round(&self, ready: Vec<RetryItem>) -> (usize, Vec<RetryItem>) {
        let permits = Arc::new(Semaphore::new(self.options.worker_limit()));
        let mut handles = Vec::new();

        for (host_name, items) in group_by_host(ready) {
            let syncer = self.clone();
            let permits = Arc::clone(&permits);
            let pending = items.clone();

            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let (mut out, succeeded) = syncer.retry_host(items).await;
                syncer.printer.print(&out.contents());
                (succeeded, out.take_retry_items())
            });
            handles.push((host_name, pending, handle));
        }

        let mut succeeded = 0;
        let mut requeued = Vec::new();
        for (host_name, pending, handle) in handles {
            match handle.await {
                Ok((count, items)) => {
                    succeeded += count;
                    requeued.extend(items);
                }
                Err(e) => {
                    error!(host = %host_name, error = %e, "retry worker panicked");
                    let error = worker_aborted(&host_name, &e);
                    self.printer.print(&format!("❌ Retry on {host_name} aborted: {error}\n"));
                    requeued.extend(pending.into_iter().map(|mut item| {
                        item.record_failure(error.clone());
                        item
                    }));
                }
            }
        }
        (succeeded, requeued)
    }

    /// Retry a host's items over one fresh session
    #[instrument(skip_all)]
    async fn retry_host(&self, items: Vec<RetryItem>) -> (OutputBuffer, usize) {
        let Some(first) = items.first() else {
            return (OutputBuffer::new("", 0), 0);
        };
        let host = Arc::clone(&first.host);
        let max_attempts = self.options.retry.max_attempts;
        let mut out = OutputBuffer::new(host.name(), 0);
        let mut succeeded = 0;

        writeln!(out, "\n🔄 Retrying {} items on {}...", items.len(), host.name());

        let session = match self.connect(&host, &out).await {
            Ok(session) => session,
            Err(e) => {
                writeln!(out, "❌ SSH connection failed for {}: {e}", host.name());
                out.mark_error();
                for mut item in items {
                    item.record_failure(e.clone());
                    out.add_retry_item(item);
                }
                return (out, 0);
            }
        };

        for mut item in items {
            let description = item.description();
            writeln!(
                out,
                "  🔄 Retrying {description} (attempt {}/{max_attempts})...",
                item.attempts + 1
            );

            let result = match &item.target {
                RetryTarget::Device(instance) => {
                    self.process_instance(instance, session.as_ref(), &out).await
                }
                RetryTarget::Upgrade => self.upgrade(&host, session.as_ref()).await,
            };

            match result {
                Ok(_) => {
                    writeln!(out, "  ✅ Retry succeeded for {description}");
                    info!(host = %host.name(), item = %description, "retry succeeded");
                    out.mark_changed();
                    succeeded += 1;
                }
                Err(e) => {
                    writeln!(out, "  ❌ Retry failed for {description}: {e}");
                    out.mark_error();
                    item.record_failure(e);
                    out.add_retry_item(item);
                }
            }
        }

        close_session(&host, session.as_ref()).await;
        out.finish();
        (out, succeeded)
    }
}

/// Output for a host whose worker never reported back
///
/// Every alive instance and the upgrade are queued again since any of
/// them may have been interrupted.
fn aborted_host(pending: PendingHost, join_error: &JoinError) -> OutputBuffer {
    let PendingHost { host, address, alive } = pending;
    let error = worker_aborted(host.name(), join_error);
    let mut out = OutputBuffer::new(host.name(), alive.len());

    writeln!(out, "\n💻  Exporter host: {} ({address})", host.name());
    writeln!(out, "    ❌ {error}");
    out.mark_error();
    queue_whole_host(&mut out, &host, alive, &error);
    out.finish();
    out
}

/// Queue every alive instance and the upgrade after a host-wide failure
fn queue_whole_host(
    out: &mut OutputBuffer,
    host: &Arc<ExporterHost>,
    alive: Vec<ExporterInstance>,
    error: &SyncError,
) {
    for instance in alive {
        out.add_retry_item(RetryItem::new(
            RetryTarget::Device(Box::new(instance)),
            Arc::clone(host),
            error.clone(),
        ));
    }
    out.add_retry_item(RetryItem::new(RetryTarget::Upgrade, Arc::clone(host), error.clone()));
}

fn worker_aborted(host: &str, join_error: &JoinError) -> SyncError {
    SyncError::WorkerAborted {
        host: host.to_string(),
        message: join_error.to_string(),
    }
}

async fn close_session(host: &ExporterHost, session: &dyn HostSession) {
    if let Err(e) = session.close().await {
        debug!(host = %host.name(), error = %e, "failed to close session");
    }
}

fn dump_rendered(out: &OutputBuffer, rendered: &RenderedInstance) {
    let spec = &rendered.config.spec;
    writeln!(out, "--- 📄 Config Template {}", "─".repeat(40));
    writeln!(out, "{}", spec.config_template);
    if !spec.systemd_container_template.is_empty() {
        writeln!(out, "  - ⚙️  Systemd Container Template {}", "─".repeat(30));
        writeln!(out, "{}", spec.systemd_container_template);
    }
    if !spec.systemd_service_template.is_empty() {
        writeln!(out, "  - 🔧 Systemd Service Template {}", "─".repeat(31));
        writeln!(out, "{}", spec.systemd_service_template);
    }
    writeln!(out, "{}", "─".repeat(60));
}
