use std::time::Duration;

use crate::container::ContainerName;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to set up runtime connections: {0}")]
    Setup(#[source] crate::connection::Error),
    #[error("at least one worker is required")]
    NoWorkers,
    #[error(transparent)]
    Runtime(#[from] crate::runtime::Error),
    #[error("stats stream of container {container} broke off: {source}")]
    Stream {
        container: ContainerName,
        #[source]
        source: crate::ndjson::Error,
    },
    #[error("failed to push metric of container {container}: {source}")]
    Sink {
        container: ContainerName,
        #[source]
        source: crate::sink::Error,
    },
    #[error("stats request for container {container} timed out after {timeout:?}")]
    Timeout {
        container: ContainerName,
        timeout: Duration,
    },
    #[error(transparent)]
    Membership(#[from] crate::membership::Error),
    #[error("poller was already started")]
    AlreadyStarted,
    #[error("poller is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
