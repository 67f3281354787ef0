//! Retry queue items and backoff policy

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use labsync_api::{ExporterHost, ExporterInstance, LabResource};
use tokio::time::Instant;

use crate::error::SyncError;

/// Exponential backoff policy for failed items
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// An item that has failed this many times is given up
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 9,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `min(base * multiplier^attempts, max_delay)`
    #[must_use]
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay an item must wait after its last attempt
    #[must_use]
    pub fn required_delay(&self, item: &RetryItem) -> Duration {
        self.backoff(item.attempts.saturating_sub(1))
    }

    #[must_use]
    pub fn is_expired(&self, item: &RetryItem) -> bool {
        item.attempts >= self.max_attempts
    }

    /// Whether enough time has passed since the item's last attempt
    #[must_use]
    pub fn is_ready(&self, item: &RetryItem, now: Instant) -> bool {
        now.saturating_duration_since(item.last_attempt) >= self.required_delay(item)
    }

    /// How long until the soonest pending item becomes ready
    ///
    /// Rounded up to whole seconds, at least one second. `None` when every
    /// item has expired.
    #[must_use]
    pub fn next_wait(&self, items: &[RetryItem], now: Instant) -> Option<Duration> {
        items
            .iter()
            .filter(|item| !self.is_expired(item))
            .map(|item| {
                let elapsed = now.saturating_duration_since(item.last_attempt);
                self.required_delay(item).saturating_sub(elapsed)
            })
            .min()
            .map(|remaining| {
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                Duration::from_secs(secs.max(1))
            })
    }

    /// Split a queue into expired, waiting and ready items
    #[must_use]
    pub fn partition(&self, items: Vec<RetryItem>, now: Instant) -> Partition {
        let mut partition = Partition::default();
        for item in items {
            if self.is_expired(&item) {
                partition.expired.push(item);
            } else if self.is_ready(&item, now) {
                partition.ready.push(item);
            } else {
                partition.waiting.push(item);
            }
        }
        partition
    }
}

/// Result of [`RetryPolicy::partition`]
#[derive(Debug, Default)]
pub struct Partition {
    pub expired: Vec<RetryItem>,
    pub waiting: Vec<RetryItem>,
    pub ready: Vec<RetryItem>,
}

/// What a retry item re-runs
#[derive(Debug, Clone)]
pub enum RetryTarget {
    /// Render and apply one exporter instance
    Device(Box<ExporterInstance>),
    /// Bootc upgrade handling for the host
    Upgrade,
}

/// Deferred unit of work with its failure history
#[derive(Debug, Clone)]
pub struct RetryItem {
    pub target: RetryTarget,
    pub host_name: String,
    /// Rendered host record the item was queued from
    pub host: Arc<ExporterHost>,
    /// Failed attempts so far
    pub attempts: u32,
    pub last_error: SyncError,
    pub last_attempt: Instant,
}

impl RetryItem {
    /// Queue a first failure
    #[must_use]
    pub fn new(target: RetryTarget, host: Arc<ExporterHost>, error: SyncError) -> Self {
        Self {
            target,
            host_name: host.name().to_string(),
            host,
            attempts: 1,
            last_error: error,
            last_attempt: Instant::now(),
        }
    }

    /// Record another failed attempt
    pub fn record_failure(&mut self, error: SyncError) {
        self.attempts += 1;
        self.last_error = error;
        self.last_attempt = Instant::now();
    }

    /// "instance NAME" or "bootc upgrade"
    #[must_use]
    pub fn description(&self) -> String {
        match &self.target {
            RetryTarget::Device(instance) => format!("instance {}", instance.name()),
            RetryTarget::Upgrade => "bootc upgrade".to_string(),
        }
    }

    /// Entry for the final retries-exhausted error
    #[must_use]
    pub fn failure_summary(&self) -> String {
        let what = match &self.target {
            RetryTarget::Device(instance) => instance.name().to_string(),
            RetryTarget::Upgrade => "bootc upgrade".to_string(),
        };
        format!("{what} on {}: {}", self.host_name, self.last_error)
    }
}

/// Group items by host name, preserving queue order within each host
#[must_use]
pub fn group_by_host(items: Vec<RetryItem>) -> BTreeMap<String, Vec<RetryItem>> {
    let mut groups: BTreeMap<String, Vec<RetryItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.host_name.clone()).or_default().push(item);
    }
    groups
}
