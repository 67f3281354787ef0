//! Per-host output buffering and the synchronized console printer

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use labsync_host::LogSink;
use tokio::time::Instant;
use tracing::warn;

use crate::retry::RetryItem;

/// Console output and outcome of one host worker
///
/// Nothing written here reaches the terminal until the buffer is handed to
/// [`SyncPrinter::flush_buffer`].
#[derive(Debug)]
pub struct OutputBuffer {
    host_name: String,
    sink: LogSink,
    instance_count: usize,
    changed: bool,
    error: bool,
    retry_items: Vec<RetryItem>,
    started: Instant,
    duration: Option<Duration>,
}

impl OutputBuffer {
    #[must_use]
    pub fn new(host_name: impl Into<String>, instance_count: usize) -> Self {
        Self {
            host_name: host_name.into(),
            sink: LogSink::new(),
            instance_count,
            changed: false,
            error: false,
            retry_items: Vec::new(),
            started: Instant::now(),
            duration: None,
        }
    }

    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Handle for a host session to log into this buffer
    #[must_use]
    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// Append formatted text, for use with `writeln!`
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) {
        self.sink.write_fmt(args);
    }

    #[must_use]
    pub fn contents(&self) -> String {
        self.sink.contents()
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn mark_error(&mut self) {
        self.error = true;
    }

    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn add_retry_item(&mut self, item: RetryItem) {
        self.retry_items.push(item);
    }

    /// Move the queued retry items out of the buffer
    pub fn take_retry_items(&mut self) -> Vec<RetryItem> {
        std::mem::take(&mut self.retry_items)
    }

    /// Stop the host's clock
    pub fn finish(&mut self) {
        self.duration = Some(self.started.elapsed());
    }

    /// Time spent on the host, up to [`finish`](Self::finish) if called
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration.unwrap_or_else(|| self.started.elapsed())
    }
}

/// Totals accumulated across flushed buffers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub ok_hosts: usize,
    pub changed_hosts: usize,
    pub failed_hosts: usize,
    pub total_instances: usize,
    pub retries_queued: usize,
    pub retries_succeeded: usize,
    pub failed_host_names: Vec<String>,
}

impl SyncStats {
    #[must_use]
    pub fn total_hosts(&self) -> usize {
        self.ok_hosts + self.changed_hosts + self.failed_hosts
    }
}

struct PrinterState {
    out: Box<dyn Write + Send>,
    failed_hosts: Vec<String>,
}

/// Serializes host output blocks onto one writer
///
/// The writer lock is the only lock shared between host workers; counters
/// are atomics updated on every flush.
pub struct SyncPrinter {
    state: Mutex<PrinterState>,
    ok_hosts: AtomicUsize,
    changed_hosts: AtomicUsize,
    failed_hosts: AtomicUsize,
    total_instances: AtomicUsize,
    retries_queued: AtomicUsize,
    retries_succeeded: AtomicUsize,
    started: Instant,
}

impl fmt::Debug for SyncPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPrinter")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Default for SyncPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPrinter {
    /// Printer writing to stdout
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    #[must_use]
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(PrinterState {
                out,
                failed_hosts: Vec::new(),
            }),
            ok_hosts: AtomicUsize::new(0),
            changed_hosts: AtomicUsize::new(0),
            failed_hosts: AtomicUsize::new(0),
            total_instances: AtomicUsize::new(0),
            retries_queued: AtomicUsize::new(0),
            retries_succeeded: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    fn write_out(state: &mut PrinterState, text: &str) {
        if let Err(e) = state.out.write_all(text.as_bytes()).and_then(|()| state.out.flush()) {
            warn!(error = %e, "failed to write sync output");
        }
    }

    /// Print text outside any host block
    pub fn print(&self, text: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::write_out(&mut state, text);
    }

    /// Print a finished host block and count its outcome
    ///
    /// Failed and changed hosts are dumped in full; quiet hosts get a
    /// one-line summary.
    pub fn flush_buffer(&self, buffer: &OutputBuffer) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        self.total_instances
            .fetch_add(buffer.instance_count(), Ordering::Relaxed);

        if buffer.has_error() {
            self.failed_hosts.fetch_add(1, Ordering::Relaxed);
            state.failed_hosts.push(buffer.host_name().to_string());
            Self::write_out(&mut state, &buffer.contents());
        } else if buffer.is_changed() {
            self.changed_hosts.fetch_add(1, Ordering::Relaxed);
            Self::write_out(&mut state, &buffer.contents());
        } else {
            self.ok_hosts.fetch_add(1, Ordering::Relaxed);
            let line = format!(
                "  ✅ {} ({} instances, no changes) [{}]\n",
                buffer.host_name(),
                buffer.instance_count(),
                format_duration(buffer.duration())
            );
            Self::write_out(&mut state, &line);
        }
    }

    /// Record retry phase totals
    pub fn add_retry_stats(&self, queued: usize, succeeded: usize) {
        self.retries_queued.fetch_add(queued, Ordering::Relaxed);
        self.retries_succeeded.fetch_add(succeeded, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        let failed_host_names = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failed_hosts
            .clone();
        SyncStats {
            ok_hosts: self.ok_hosts.load(Ordering::Relaxed),
            changed_hosts: self.changed_hosts.load(Ordering::Relaxed),
            failed_hosts: self.failed_hosts.load(Ordering::Relaxed),
            total_instances: self.total_instances.load(Ordering::Relaxed),
            retries_queued: self.retries_queued.load(Ordering::Relaxed),
            retries_succeeded: self.retries_succeeded.load(Ordering::Relaxed),
            failed_host_names,
        }
    }

    /// Print run totals; nothing is printed when no host was flushed
    pub fn print_summary(&self) {
        let stats = self.stats();
        if stats.total_hosts() == 0 {
            return;
        }

        let mut text = String::from("\n📊 Summary\n");
        text.push_str(&format!(
            "  Hosts:      {} processed ({} ok, {} changed, {} failed)\n",
            stats.total_hosts(),
            stats.ok_hosts,
            stats.changed_hosts,
            stats.failed_hosts
        ));
        text.push_str(&format!("  Instances:  {} total\n", stats.total_instances));
        if stats.retries_queued > 0 {
            text.push_str(&format!(
                "  Retries:    {} queued, {} succeeded, {} gave up\n",
                stats.retries_queued,
                stats.retries_succeeded,
                stats.retries_queued.saturating_sub(stats.retries_succeeded)
            ));
        }
        text.push_str(&format!(
            "  Runtime:    {}\n",
            format_duration(self.started.elapsed())
        ));
        if !stats.failed_host_names.is_empty() {
            text.push_str("  Failed hosts:\n");
            for host in &stats.failed_host_names {
                text.push_str(&format!("    ❌ {host}\n"));
            }
        }

        self.print(&text);
    }
}

/// "850ms", "12.3s" or "2m5s"
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else if duration < Duration::from_secs(60) {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{}s", secs / 60, secs % 60)
    }
}
