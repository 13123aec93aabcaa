//! The downstream side of the poller.
//!
//! A [`Sink`] receives every computed [`Metric`] exactly once. Sinks are shared by all stats
//! workers and therefore must accept concurrent pushes.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::container::ContainerName;
use crate::stats::Metric;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sink is closed")]
    Closed,
    #[error("failed to encode metric: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub trait Sink: Send + Sync + 'static {
    /// Delivers one metric.
    fn push(&self, metric: Metric) -> impl Future<Output = Result<(), Error>> + Send;

    /// Flushes and releases the sink. Called once, after the last push.
    fn close(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Forgets everything the sink holds for a container that stopped.
    fn clear(&self, _name: &ContainerName) {}
}

/// Writes every metric as a JSON line to the `metrics` log target.
#[derive(Debug, Default)]
pub struct LogSink {
    closed: AtomicBool,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for LogSink {
    async fn push(&self, metric: Metric) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let line = serde_json::to_string(&metric)?;
        log::info!(target: "metrics", "{}", line);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn clear(&self, name: &ContainerName) {
        log::debug!(target: "metrics", "container {} stopped reporting", name);
    }
}
