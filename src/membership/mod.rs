//! Tracking which containers are running.
//!
//! The [`MembershipMonitor`] follows the runtime's event stream and keeps the [`LiveSet`]
//! in sync with container starts and stops, notifying a [`MembershipListener`] of every
//! change. Metadata of a started container is fetched through a [`ContainerSource`].

mod live;
mod monitor;

use crate::container::{Container, ContainerName};

pub use live::LiveSet;
pub use monitor::MembershipMonitor;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("membership monitor is already running")]
    AlreadyStarted,
    #[error("membership monitor is closed")]
    Closed,
}

/// Resolves a container name or id to its full record.
pub trait ContainerSource: Send + Sync + 'static {
    fn request_container(
        &self,
        name: &str,
    ) -> impl Future<Output = crate::runtime::Result<Container>> + Send;
}

/// Receives membership changes. Called from the monitor's task, so implementations should
/// return quickly.
pub trait MembershipListener: Send + Sync + 'static {
    fn container_added(&self, container: &Container);

    fn container_removed(&self, name: &ContainerName);
}
