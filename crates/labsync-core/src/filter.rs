//! Exporter filter and dead-instance selection

use labsync_api::{ExporterInstance, LabResource};

use crate::config::SyncOptions;

/// Instances of one host selected for a sync pass
#[derive(Debug, Clone, Default)]
pub struct HostSelection {
    /// Matching instances without the dead annotation, in input order
    pub alive: Vec<ExporterInstance>,
    /// Matching dead instances as (name, annotation value)
    pub dead: Vec<(String, String)>,
}

impl HostSelection {
    /// Nothing left to sync on this host
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.alive.is_empty()
    }

    /// Notice for a host whose matching instances are all dead
    #[must_use]
    pub fn skip_message(&self, host: &str) -> Option<String> {
        if !self.is_skipped() || self.dead.is_empty() {
            return None;
        }
        let reasons = self
            .dead
            .iter()
            .map(|(name, reason)| format!("{name}: {reason}"))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "\n💻  Exporter host: {host} skipped - all instances dead: [{reasons}]\n"
        ))
    }
}

/// Apply the name filter, then split off dead instances
///
/// An instance is dead when it carries the dead annotation, whatever the value.
#[must_use]
pub fn select_instances<I>(instances: I, options: &SyncOptions) -> HostSelection
where
    I: IntoIterator<Item = ExporterInstance>,
{
    let mut selection = HostSelection::default();
    for instance in instances {
        if !options.matches(instance.name()) {
            continue;
        }
        match instance.dead_reason() {
            Some(reason) => selection
                .dead
                .push((instance.name().to_string(), reason.to_string())),
            None => selection.alive.push(instance),
        }
    }
    selection
}
