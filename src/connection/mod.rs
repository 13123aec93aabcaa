//! Persistent HTTP/1.1 connections to the container runtime's API.
//!
//! A [`Connector`] resolves a [`ConnectionMode`] (unix socket, TCP, or TLS over TCP) once,
//! and dials transport streams from it. Each [`Connection`] owns one client connection whose
//! driver runs on its own task; the [`ConnectionPool`] lends a fixed set of them to the
//! stats workers and keeps one aside for administrative queries.
//!
//! A connection is shared through an [`Arc`], so a lent handle may be returned to the pool
//! while a request issued through it is still streaming its response. Requests sent on the
//! same connection are serialized by the HTTP/1 dispatcher: a later request waits until the
//! connection is ready again.

mod connector;
mod error;
mod pool;
mod tls;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{Request, Response};
use tokio::task::JoinHandle;
use tower::ServiceExt;

pub use connector::{BoxedIo, ConnectionMode, Connector};
pub use error::{Error, Result};
pub use pool::ConnectionPool;
pub use tls::TlsFiles;

#[derive(Debug)]
struct Established {
    sender: http1::SendRequest<Empty<Bytes>>,
    driver: JoinHandle<()>,
}

impl Established {
    async fn dial(connector: &Connector) -> Result<Self> {
        let endpoint = connector.to_string();
        let io = connector
            .clone()
            .oneshot(connector.endpoint().clone())
            .await
            .map_err(|source| Error::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        let (sender, connection) =
            http1::handshake(io)
                .await
                .map_err(|source| Error::Handshake {
                    endpoint: endpoint.clone(),
                    source,
                })?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::debug!("connection to {} terminated: {}", endpoint, err);
            }
        });

        Ok(Self { sender, driver })
    }
}

#[derive(Debug)]
struct Inner {
    id: usize,
    connector: Connector,
    closed: AtomicBool,
    state: tokio::sync::Mutex<Option<Established>>,
}

/// A handle to one persistent connection.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Dials a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] or [`Error::Handshake`] if the runtime cannot be reached.
    pub async fn establish(id: usize, connector: Connector) -> Result<Self> {
        let established = Established::dial(&connector).await?;
        log::trace!("established connection #{} to {}", id, connector);

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                connector,
                closed: AtomicBool::new(false),
                state: tokio::sync::Mutex::new(Some(established)),
            }),
        })
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Sends `GET path` and returns the response once its head has arrived.
    ///
    /// The connection is re-dialed first if the runtime closed it since the last request.
    /// The body is left unread; it must be consumed or dropped before the connection can
    /// carry the next request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`Connection::close`], and a connection error if the
    /// request could not be exchanged.
    pub async fn get(&self, path: &str) -> Result<Response<Incoming>> {
        let request = Request::get(path)
            .header(hyper::header::HOST, self.inner.connector.authority())
            .body(Empty::<Bytes>::new())
            .map_err(|source| Error::Request {
                path: path.to_owned(),
                source,
            })?;

        let response = {
            let mut state = self.inner.state.lock().await;
            if self.is_closed() {
                return Err(Error::Closed);
            }
            let established = match state.take() {
                Some(mut established) if !established.sender.is_closed() => {
                    match established.sender.ready().await {
                        Ok(()) => established,
                        Err(err) => {
                            log::debug!(
                                "connection #{} is no longer usable: {}",
                                self.inner.id,
                                err
                            );
                            established.driver.abort();
                            self.redial().await?
                        }
                    }
                }
                _ => self.redial().await?,
            };
            let established = state.insert(established);
            established
                .sender
                .ready()
                .await
                .map_err(|source| Error::Http {
                    path: path.to_owned(),
                    source,
                })?;
            established.sender.send_request(request)
        };

        response.await.map_err(|source| Error::Http {
            path: path.to_owned(),
            source,
        })
    }

    async fn redial(&self) -> Result<Established> {
        log::debug!(
            "re-dialing connection #{} to {}",
            self.inner.id,
            self.inner.connector
        );
        Established::dial(&self.inner.connector).await
    }

    /// Drops the underlying transport, e.g. after a request on it stalled. The next request
    /// dials a fresh one.
    pub async fn reset(&self) {
        if let Some(established) = self.inner.state.lock().await.take() {
            established.driver.abort();
            log::debug!("reset connection #{}", self.inner.id);
        }
    }

    /// Closes the connection. Later requests fail with [`Error::Closed`].
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Some(established) = self.inner.state.lock().await.take() {
            established.driver.abort();
            log::trace!("closed connection #{}", self.inner.id);
        }
    }
}
