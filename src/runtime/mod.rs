//! The four runtime API calls the poller relies on.
//!
//! | call                  | endpoint                               |
//! |-----------------------|----------------------------------------|
//! | [`Client::containers`]| `GET /containers/json`                 |
//! | [`Client::inspect`]   | `GET /containers/{name}/json`          |
//! | [`Client::stats`]     | `GET /containers/{name}/stats?stream=0`|
//! | [`Client::events`]    | `GET /events`                          |
//!
//! The streaming calls hand back the response body as a [`RecordStream`] so records are
//! decoded as they arrive.

mod error;
pub mod models;

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use http_body_util::BodyExt;
use hyper::Response;
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use tokio_util::io::StreamReader;

use crate::connection::Connection;
use crate::container::{Container, ContainerName};
use crate::ndjson::JsonLines;

pub use error::{Error, Result};
use models::{InspectedContainer, ListedContainer};

/// A response body read as newline-delimited JSON records.
pub type RecordStream =
    JsonLines<StreamReader<BoxStream<'static, std::io::Result<Bytes>>, Bytes>>;

/// Issues runtime API calls over one [`Connection`].
#[derive(Debug, Clone)]
pub struct Client {
    connection: Connection,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            timeout: None,
        }
    }

    /// Bounds [`containers`](Self::containers) and [`inspect`](Self::inspect), including
    /// reading their responses. A call that runs out of time resets the connection.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lists the running containers, keyed by canonical name.
    ///
    /// Entries the runtime reports without a usable name are skipped.
    pub async fn containers(&self) -> Result<HashMap<ContainerName, Container>> {
        let listed: Vec<ListedContainer> = self.fetch("/containers/json".to_owned()).await?;

        let mut containers = HashMap::with_capacity(listed.len());
        for entry in listed {
            match Container::from_reported(entry.names, entry.labels) {
                Ok(container) => {
                    containers.insert(container.name().clone(), container);
                }
                Err(err) => log::warn!("skipping listed container: {}", err),
            }
        }
        Ok(containers)
    }

    /// Fetches the record of a single container by name or id.
    pub async fn inspect(&self, name: &str) -> Result<Container> {
        let inspected: InspectedContainer =
            self.fetch(format!("/containers/{}/json", name)).await?;

        let canonical = if inspected.name.is_empty() {
            ContainerName::canonical(name)?
        } else {
            ContainerName::canonical(&inspected.name)?
        };
        let names = if inspected.name.is_empty() {
            Vec::new()
        } else {
            vec![inspected.name]
        };
        Ok(Container::new(canonical, names, inspected.config.labels))
    }

    /// Requests one stats sample of a container.
    pub async fn stats(&self, name: &ContainerName) -> Result<RecordStream> {
        self.stream(format!("/containers/{}/stats?stream=0", name))
            .await
    }

    /// Subscribes to the runtime's event stream. The stream stays open until the runtime
    /// or the connection closes it.
    pub async fn events(&self) -> Result<RecordStream> {
        self.stream("/events".to_owned()).await
    }

    async fn request(&self, path: &str) -> Result<Response<Incoming>> {
        let response = self.connection.get(path).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.into_body().collect().await {
            Ok(body) => error_message(&body.to_bytes()),
            Err(_) => String::new(),
        };
        Err(Error::Status {
            path: path.to_owned(),
            status,
            message,
        })
    }

    async fn fetch<T>(&self, path: String) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.read(&path)).await {
                Ok(body) => body?,
                Err(_) => {
                    self.connection.reset().await;
                    return Err(Error::Timeout { path, timeout });
                }
            },
            None => self.read(&path).await?,
        };

        serde_json::from_slice(&body).map_err(|source| Error::Decode { path, source })
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let body = self
            .request(path)
            .await?
            .into_body()
            .collect()
            .await
            .map_err(|source| Error::Body {
                path: path.to_owned(),
                source,
            })?;

        Ok(body.to_bytes())
    }

    async fn stream(&self, path: String) -> Result<RecordStream> {
        let body = self
            .request(&path)
            .await?
            .into_body()
            .into_data_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(JsonLines::new(StreamReader::new(body)))
    }
}

/// Extracts `message` from a runtime error body, falling back to the raw body.
fn error_message(body: &[u8]) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_slice::<ErrorBody>(body)
        .map(|err| err.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_owned())
}
