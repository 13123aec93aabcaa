use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::container::Container;
use crate::runtime;
use crate::sink::Sink;
use crate::stats::{ContainerStats, Metric};
use crate::worker::Processor;

use super::{Error, Result};

/// One stats request: a lent connection and the container to query over it.
#[derive(Debug)]
pub(super) struct Workload {
    pub(super) connection: Connection,
    pub(super) container: Container,
}

/// Runs a [`Workload`] on a worker and forwards each resulting metric to the sink.
pub(super) struct StatsProcessor<S> {
    pub(super) sink: Arc<S>,
    pub(super) shutdown: CancellationToken,
    pub(super) request_timeout: Duration,
}

impl<S> Processor<Workload> for StatsProcessor<S>
where
    S: Sink,
{
    type Error = Error;

    /// Runs the request to completion even during shutdown; only pushing stops then.
    async fn process(&self, workload: Workload) -> Result<()> {
        let container = workload.container.name().clone();
        let connection = workload.connection.clone();

        match tokio::time::timeout(self.request_timeout, self.poll(workload)).await {
            Ok(result) => result,
            Err(_) => {
                connection.reset().await;
                Err(Error::Timeout {
                    container,
                    timeout: self.request_timeout,
                })
            }
        }
    }

    fn on_error(&self, error: Error) {
        log::error!("stats poll failed: {}", error);
    }
}

impl<S> StatsProcessor<S>
where
    S: Sink,
{
    async fn poll(&self, workload: Workload) -> Result<()> {
        let Workload {
            connection,
            container,
        } = workload;
        log::trace!(
            "requesting stats of {} over connection #{}",
            container.name(),
            connection.id()
        );

        let mut records = runtime::Client::new(connection)
            .stats(container.name())
            .await?;
        loop {
            let stats = match records.next_record::<ContainerStats>().await {
                Ok(Some(stats)) => stats,
                Ok(None) => return Ok(()),
                Err(source) => {
                    return Err(Error::Stream {
                        container: container.name().clone(),
                        source,
                    });
                }
            };
            if self.shutdown.is_cancelled() {
                log::trace!("dropping stats of {} computed after shutdown", container.name());
                continue;
            }

            self.sink
                .push(Metric::from_sample(&container, &stats))
                .await
                .map_err(|source| Error::Sink {
                    container: container.name().clone(),
                    source,
                })?;
        }
    }
}
