//! Creo Poller: polls a container runtime's stats API for every running container and
//! pushes the derived utilization metrics to a pluggable sink.
//!
//! The runtime is reached over a unix socket, plain TCP or TLS. A fixed pool of persistent
//! connections is shared by a fixed set of workers, each tick dispatching one stats request
//! per container. The set of containers follows the runtime's event stream, so containers
//! come and go without a restart.
//!
//! The main entry point is [`poller::Poller`]; metrics leave the crate through the
//! [`sink::Sink`] trait.

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};

pub mod config;
pub mod connection;
pub mod container;
pub mod error;
pub mod membership;
pub mod ndjson;
pub mod poller;
pub mod runtime;
pub mod sink;
pub mod stats;
pub mod worker;

#[cfg(test)]
mod testutil;

/// Runs the poller configured from the environment until the process receives `SIGINT` or
/// `SIGTERM`, logging every metric.
///
/// # Errors
///
/// Fails on invalid configuration, if the runtime cannot be reached at startup, or if the
/// initial container listing fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    let sink = Arc::new(sink::LogSink::new());
    let poller = poller::Poller::connect(sink, config.mode, config.options).await?;
    if let Err(err) = poller.start(config.interval).await {
        poller.close().await;
        return Err(err.into());
    }

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    log::info!("Received shutdown signal");

    poller.close().await;
    Ok(())
}
