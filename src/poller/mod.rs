//! The polling engine.
//!
//! A [`Poller`] owns every moving part: the [`ConnectionPool`], the [`WorkerPool`] running
//! stats requests, the [`MembershipMonitor`] tracking which containers to poll, and the
//! [`Sink`] receiving the resulting metrics. Once [started](Poller::start), a tick loop
//! dispatches one stats request per live container per interval.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use creo_poller::connection::ConnectionMode;
//! # use creo_poller::poller::{Poller, PollerOptions};
//! # use creo_poller::sink::LogSink;
//! # async fn example() -> creo_poller::poller::Result<()> {
//! let mode = ConnectionMode::Unix("/var/run/docker.sock".into());
//! let poller = Poller::connect(Arc::new(LogSink::new()), mode, PollerOptions::default()).await?;
//! poller.start(Duration::from_secs(5)).await?;
//! // ...
//! poller.close().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod processor;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionMode, ConnectionPool, Connector};
use crate::container::{Container, ContainerName};
use crate::membership::{LiveSet, MembershipListener, MembershipMonitor};
use crate::runtime;
use crate::sink::Sink;
use crate::worker::{self, WorkerPool};

pub use error::{Error, Result};
use processor::{StatsProcessor, Workload};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PollerOptions {
    /// Number of stats workers, and of pooled connections.
    pub workers: usize,
    /// Upper bound for a single stats, list or inspect request, including reading its
    /// response.
    pub request_timeout: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Clears a sink's state for containers that stop.
struct SinkNotifier<S> {
    sink: Arc<S>,
}

impl<S> MembershipListener for SinkNotifier<S>
where
    S: Sink,
{
    fn container_added(&self, container: &Container) {
        log::trace!("polling {} from the next tick on", container.name());
    }

    fn container_removed(&self, name: &ContainerName) {
        self.sink.clear(name);
    }
}

/// Hands workloads to the workers. Shared by the poller and its tick loop.
#[derive(Clone)]
struct Dispatcher {
    pool: Arc<ConnectionPool>,
    workers: Arc<WorkerPool<Workload>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    async fn query(&self, container: Container) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }
        let connection = self.pool.acquire().await.map_err(|_| Error::Closed)?;
        let workload = Workload {
            connection: connection.clone(),
            container,
        };
        let sent = self.workers.send(workload).await;
        self.pool.release(connection);

        sent.map_err(|_: worker::Error| Error::Closed)
    }
}

type Monitor<S> = MembershipMonitor<runtime::Client, SinkNotifier<S>>;

/// Polls the stats of every running container and pushes the metrics to a sink.
pub struct Poller<S: Sink> {
    dispatcher: Dispatcher,
    client: runtime::Client,
    events: Connection,
    monitor: Arc<Monitor<S>>,
    sink: Arc<S>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl<S> Poller<S>
where
    S: Sink,
{
    /// Connects to the runtime at `mode` and spawns the workers.
    ///
    /// Dials `options.workers` pooled connections, one dedicated connection for list and
    /// inspect queries, and one for the event stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if the address or TLS material is invalid or any connection
    /// cannot be established, and [`Error::NoWorkers`] for zero workers.
    pub async fn connect(sink: Arc<S>, mode: ConnectionMode, options: PollerOptions) -> Result<Self> {
        if options.workers == 0 {
            return Err(Error::NoWorkers);
        }
        let connector = Connector::new(mode).map_err(Error::Setup)?;
        let pool = Arc::new(
            ConnectionPool::connect(&connector, options.workers)
                .await
                .map_err(Error::Setup)?,
        );
        let events = Connection::establish(pool.size(), connector.clone())
            .await
            .map_err(Error::Setup)?;

        let shutdown = CancellationToken::new();
        let processor = Arc::new(StatsProcessor {
            sink: Arc::clone(&sink),
            shutdown: shutdown.clone(),
            request_timeout: options.request_timeout,
        });
        let workers = Arc::new(WorkerPool::new(options.workers, processor));
        let client =
            runtime::Client::new(pool.dedicated().clone()).with_timeout(options.request_timeout);
        let monitor = Arc::new(MembershipMonitor::new(
            client.clone(),
            SinkNotifier {
                sink: Arc::clone(&sink),
            },
            shutdown.child_token(),
        ));
        log::info!(
            "connected to container runtime at {} with {} workers",
            connector,
            options.workers
        );

        Ok(Self {
            dispatcher: Dispatcher {
                pool,
                workers,
                shutdown,
            },
            client,
            events,
            monitor,
            sink,
            ticker: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Lists the running containers over the dedicated connection.
    pub async fn get_containers(&self) -> Result<HashMap<ContainerName, Container>> {
        Ok(self.client.containers().await?)
    }

    /// Inspects one container over the dedicated connection.
    pub async fn request_container(&self, name: &str) -> Result<Container> {
        Ok(self.client.inspect(name).await?)
    }

    /// Queues one stats request for `container`.
    ///
    /// Returns once a worker accepted the request, not once it completed; failures of the
    /// request itself are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once the poller is shutting down.
    pub async fn query(&self, container: Container) -> Result<()> {
        self.dispatcher.query(container).await
    }

    /// The containers currently being polled.
    pub fn live(&self) -> &LiveSet {
        self.monitor.live()
    }

    /// Starts tracking containers and polling them every `interval`.
    ///
    /// The event stream is opened before the initial listing, so containers starting in
    /// between are not missed.
    ///
    /// # Errors
    ///
    /// Fails if the poller was started before or closed, or if the runtime cannot be
    /// queried.
    pub async fn start(&self, interval: Duration) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let events = runtime::Client::new(self.events.clone()).events().await?;
        let containers = self.get_containers().await?;
        self.monitor.seed(containers.into_values());
        self.monitor.start(events)?;

        let handle = tokio::spawn(tick(
            self.dispatcher.clone(),
            Arc::clone(&self.monitor),
            interval,
        ));
        *self.ticker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        log::info!("polling container stats every {:?}", interval);
        Ok(())
    }

    /// Shuts the poller down.
    ///
    /// Stops the membership monitor and the tick loop, waits for queued requests to finish,
    /// closes every connection and finally the sink. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("shutting down poller");
        self.dispatcher.shutdown.cancel();

        self.monitor.close().await;
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ticker) = ticker {
            if let Err(err) = ticker.await {
                log::error!("tick loop terminated abnormally: {}", err);
            }
        }
        self.dispatcher.workers.close().await;
        self.dispatcher.pool.close_all().await;
        self.events.close().await;
        self.sink.close().await;
        log::debug!("poller closed");
    }
}

async fn tick<S>(dispatcher: Dispatcher, monitor: Arc<Monitor<S>>, interval: Duration)
where
    S: Sink,
{
    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = dispatcher.shutdown.cancelled() => break,
            _ = ticks.tick() => {}
        }
        let containers = monitor.live().snapshot();
        log::trace!("dispatching stats requests for {} containers", containers.len());

        for container in containers {
            let dispatched = tokio::select! {
                _ = dispatcher.shutdown.cancelled() => Err(Error::Closed),
                result = dispatcher.query(container) => result,
            };
            if dispatched.is_err() {
                log::trace!("tick loop stopped while dispatching");
                return;
            }
        }
    }
    log::trace!("tick loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeDaemon, RecordingSink, Reply, eventually, stats_record};

    const INTERVAL: Duration = Duration::from_millis(20);

    fn event(action: &str, name: &str) -> String {
        serde_json::json!({
            "Type": "container",
            "Action": action,
            "Actor": {"ID": format!("id-{name}"), "Attributes": {"name": name}},
        })
        .to_string()
    }

    fn fake_runtime(events: String) -> FakeDaemon {
        FakeDaemon::start(move |path| match path {
            "/containers/json" => Reply::ok(r#"[{"Names":["/web"],"Labels":{"app":"shop"}}]"#),
            "/events" => Reply::Open(events.clone()),
            "/containers/stuck/json" => Reply::Open(String::new()),
            "/containers/api/json" => {
                Reply::ok(r#"{"Name":"/api","Config":{"Labels":{"app":"gateway"}}}"#)
            }
            path if path.ends_with("/stats?stream=0") => Reply::ok(stats_record(
                (1_000_000, 1_500_000),
                (5_000_000, 6_000_000),
                512,
                1024,
            )),
            _ => Reply::status(hyper::StatusCode::NOT_FOUND),
        })
    }

    async fn poller(daemon: &FakeDaemon, sink: &Arc<RecordingSink>) -> Poller<RecordingSink> {
        poller_with_timeout(daemon, sink, Duration::from_secs(2)).await
    }

    async fn poller_with_timeout(
        daemon: &FakeDaemon,
        sink: &Arc<RecordingSink>,
        request_timeout: Duration,
    ) -> Poller<RecordingSink> {
        let options = PollerOptions {
            workers: 2,
            request_timeout,
        };
        Poller::connect(Arc::clone(sink), daemon.mode(), options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_polls_listed_containers() {
        let daemon = fake_runtime(String::new());
        let sink = Arc::new(RecordingSink::default());
        let poller = poller(&daemon, &sink).await;

        poller.start(INTERVAL).await.unwrap();
        eventually(|| sink.metrics().len() >= 2).await;
        poller.close().await;

        let metric = &sink.metrics()[0];
        assert_eq!(metric.name.as_ref(), "web");
        assert_eq!(metric.cpu_percent, 50.0);
        assert_eq!(metric.memory_percent, 50.0);
        assert_eq!(metric.labels.get("app").map(String::as_str), Some("shop"));
        assert!(sink.is_closed());
        assert!(poller.live().is_empty());

        let requests = daemon.requests();
        assert_eq!(requests[0], "/events");
        assert_eq!(requests[1], "/containers/json");
        assert!(requests[2..].iter().all(|path| path == "/containers/web/stats?stream=0"));
    }

    #[tokio::test]
    async fn test_follows_membership_events() {
        let events = format!("{}\n{}\n", event("start", "api"), event("die", "web"));
        let daemon = fake_runtime(events);
        let sink = Arc::new(RecordingSink::default());
        let poller = poller(&daemon, &sink).await;

        poller.start(INTERVAL).await.unwrap();
        eventually(|| sink.metrics().iter().any(|metric| metric.name.as_ref() == "api")).await;
        eventually(|| sink.cleared() == vec!["web".to_owned()]).await;

        assert!(poller.live().contains("api"));
        assert!(!poller.live().contains("web"));
        let api = poller.live().get("api").unwrap();
        assert_eq!(api.labels().get("app").map(String::as_str), Some("gateway"));
        poller.close().await;
    }

    #[tokio::test]
    async fn test_stalled_inspect_does_not_block_membership() {
        let events = format!("{}\n{}\n", event("start", "stuck"), event("die", "web"));
        let daemon = fake_runtime(events);
        let sink = Arc::new(RecordingSink::default());
        let poller = poller_with_timeout(&daemon, &sink, Duration::from_millis(100)).await;

        poller.start(Duration::from_secs(60)).await.unwrap();
        eventually(|| sink.cleared() == vec!["web".to_owned()]).await;

        assert!(!poller.live().contains("web"));
        assert!(poller.live().contains("stuck"));
        let containers = tokio::time::timeout(Duration::from_secs(1), poller.get_containers())
            .await
            .expect("dedicated connection still blocked")
            .unwrap();
        assert!(containers.contains_key("web"));
        poller.close().await;
    }

    #[tokio::test]
    async fn test_start_twice_and_query_after_close() {
        let daemon = fake_runtime(String::new());
        let sink = Arc::new(RecordingSink::default());
        let poller = poller(&daemon, &sink).await;

        poller.start(Duration::from_secs(60)).await.unwrap();
        assert!(matches!(
            poller.start(INTERVAL).await,
            Err(Error::AlreadyStarted)
        ));

        poller.close().await;
        poller.close().await;

        assert!(poller.request_container("api").await.is_err());
        let container = Container::new(ContainerName::new("web").unwrap(), Vec::new(), HashMap::new());
        assert!(matches!(poller.query(container).await, Err(Error::Closed)));
        assert!(matches!(poller.start(INTERVAL).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_query_and_dedicated_calls() {
        let daemon = fake_runtime(String::new());
        let sink = Arc::new(RecordingSink::default());
        let poller = poller(&daemon, &sink).await;

        let containers = poller.get_containers().await.unwrap();
        assert!(containers.contains_key("web"));
        let api = poller.request_container("api").await.unwrap();
        assert_eq!(api.name().as_ref(), "api");

        poller.query(api).await.unwrap();
        eventually(|| sink.metrics().len() == 1).await;
        poller.close().await;

        assert_eq!(sink.metrics()[0].name.as_ref(), "api");
    }

    #[tokio::test]
    async fn test_connect_errors() {
        let sink = Arc::new(RecordingSink::default());
        let dir = tempfile::tempdir().unwrap();
        let mode = ConnectionMode::Unix(dir.path().join("missing.sock"));

        let result = Poller::connect(Arc::clone(&sink), mode.clone(), PollerOptions::default()).await;
        assert!(matches!(result, Err(Error::Setup(_))));

        let options = PollerOptions {
            workers: 0,
            ..PollerOptions::default()
        };
        let result = Poller::connect(sink, mode, options).await;
        assert!(matches!(result, Err(Error::NoWorkers)));
    }
}
