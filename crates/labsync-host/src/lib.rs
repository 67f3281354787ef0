//! labsync-host: Remote exporter host sessions
//!
//! A [`HostSession`] is one open connection to an exporter host. It checks
//! reachability, reconciles the exporter's config and systemd unit files,
//! restarts the service when they change, and schedules bootc upgrades.

pub mod bootc;
pub mod error;
pub mod files;
pub mod remote;
pub mod sink;
pub mod traits;

pub use error::HostError;
pub use remote::RemoteHostSession;
pub use sink::LogSink;
pub use traits::HostSession;
