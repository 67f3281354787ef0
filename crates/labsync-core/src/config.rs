//! Sync run options

use regex::Regex;

use crate::retry::RetryPolicy;

/// Options for one [`ExporterHostSyncer`](crate::ExporterHostSyncer) run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Detect and report changes without mutating any host
    pub dry_run: bool,
    /// Dump rendered templates into each host's output block
    pub debug_configs: bool,
    /// Only instances whose name matches are synced
    pub exporter_filter: Option<Regex>,
    /// Maximum hosts processed concurrently; 0 runs sequentially
    pub parallelism: usize,
    pub retry: RetryPolicy,
}

impl SyncOptions {
    /// Number of concurrent host workers
    #[must_use]
    pub fn worker_limit(&self) -> usize {
        self.parallelism.max(1)
    }

    /// Whether `name` passes the exporter filter
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.exporter_filter
            .as_ref()
            .is_none_or(|filter| filter.is_match(name))
    }
}
