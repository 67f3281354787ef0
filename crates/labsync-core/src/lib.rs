//! labsync-core: Exporter host synchronization engine
//!
//! Renders every exporter instance against its config template, pushes the
//! result to its exporter host through a [`HostSession`], schedules bootc
//! upgrades, and replays failures through a backoff retry queue. Console
//! output is buffered per host and flushed atomically by a [`SyncPrinter`].
//!
//! [`HostSession`]: labsync_host::HostSession

pub mod config;
pub mod error;
pub mod filter;
pub mod lab;
pub mod output;
pub mod render;
pub mod retry;
pub mod syncer;

pub use config::SyncOptions;
pub use error::SyncError;
pub use filter::{HostSelection, select_instances};
pub use lab::{LabConfig, LabResources};
pub use output::{OutputBuffer, SyncPrinter, SyncStats};
pub use render::{InstanceRenderer, RenderedInstance};
pub use retry::{RetryItem, RetryPolicy, RetryTarget};
pub use syncer::{ExporterHostSyncer, SessionFactory};
