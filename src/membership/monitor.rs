use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::container::{Container, ContainerName};
use crate::error::ResultOkLogExt;
use crate::ndjson::{self, JsonLines};
use crate::runtime::{self, models::Event};

use super::{ContainerSource, Error, LiveSet, MembershipListener};

/// Event attributes that describe the container itself rather than labels.
const NON_LABEL_ATTRIBUTES: [&str; 2] = ["name", "image"];

impl ContainerSource for runtime::Client {
    async fn request_container(&self, name: &str) -> runtime::Result<Container> {
        self.inspect(name).await
    }
}

/// Keeps the live set in sync with the runtime's container events.
#[derive(Debug)]
pub struct MembershipMonitor<S, L> {
    live: LiveSet,
    source: S,
    listener: L,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl<S, L> MembershipMonitor<S, L>
where
    S: ContainerSource,
    L: MembershipListener,
{
    /// Creates a monitor that stops when `shutdown` is cancelled or on [`Self::close`].
    pub fn new(source: S, listener: L, shutdown: CancellationToken) -> Self {
        Self {
            live: LiveSet::default(),
            source,
            listener,
            shutdown,
            task: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn live(&self) -> &LiveSet {
        &self.live
    }

    /// Adds an initial snapshot of running containers, notifying the listener of each new one.
    pub fn seed(&self, containers: impl IntoIterator<Item = Container>) {
        for container in containers {
            self.add(container);
        }
        log::debug!("seeded {} live containers", self.live.size());
    }

    /// Follows `events` on a new task until the stream ends, fails, or the monitor closes.
    ///
    /// # Errors
    ///
    /// Fails if the monitor was started before or is already closed.
    pub fn start<R>(self: &Arc<Self>, events: JsonLines<R>) -> Result<(), Error>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move { monitor.watch(events).await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Consumes `events` until end-of-stream, a read error, or shutdown.
    ///
    /// Undecodable records are skipped. The stream is not re-opened once it ends.
    pub async fn watch<R>(&self, mut events: JsonLines<R>)
    where
        R: AsyncBufRead + Unpin,
    {
        log::debug!("watching container events");
        loop {
            let record = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                record = events.next_record::<Event>() => record,
            };
            let event = match record {
                Ok(Some(event)) => event,
                Ok(None) => {
                    log::warn!("runtime closed the event stream");
                    break;
                }
                Err(err @ ndjson::Error::Decode { .. }) => {
                    log::warn!("skipping event: {}", err);
                    continue;
                }
                Err(err) => {
                    log::error!("event stream failed: {}", err);
                    break;
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                () = self.handle(event) => {}
            }
        }
        log::debug!(
            "stopped watching container events after {} records",
            events.lines_read()
        );
    }

    async fn handle(&self, event: Event) {
        if !event.is_container() {
            return;
        }
        let Some(subject) = event.subject() else {
            log::debug!("ignoring container event without subject");
            return;
        };

        match event.action() {
            "start" => {
                let inspected = self.source.request_container(subject).await.ok_warn(
                    format_args!("failed to inspect started container {subject}, using event attributes"),
                );
                if let Some(container) =
                    inspected.or_else(|| from_attributes(subject, &event).ok_log())
                {
                    self.add(container);
                }
            }
            "die" | "stop" => {
                let Some(name) = ContainerName::canonical(subject).ok_log() else {
                    return;
                };
                if self.live.remove(&name).is_some() {
                    log::info!("container {} stopped", name);
                    self.listener.container_removed(&name);
                }
            }
            _ => {}
        }
    }

    fn add(&self, container: Container) {
        let name = container.name().clone();
        if self.live.insert(container.clone()) {
            log::info!("container {} started", name);
            self.listener.container_added(&container);
        } else {
            log::debug!("refreshed container {}", name);
        }
    }

    /// Stops following events and forgets every live container. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                log::error!("event watcher terminated abnormally: {}", err);
            }
        }
        self.live.clear();
        log::debug!("membership monitor closed");
    }
}

fn from_attributes(subject: &str, event: &Event) -> crate::container::Result<Container> {
    let labels: HashMap<String, String> = event
        .actor
        .attributes
        .iter()
        .filter(|(key, _)| !NON_LABEL_ATTRIBUTES.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Container::new(
        ContainerName::canonical(subject)?,
        Vec::new(),
        labels,
    ))
}
