//! A fake container runtime serving canned HTTP responses over a unix socket, TCP or TLS.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig};

use crate::connection::{ConnectionMode, Connector, TlsFiles};

pub(crate) const CA_PEM: &str = include_str!("connection/testdata/ca.pem");
pub(crate) const SERVER_PEM: &str = include_str!("connection/testdata/server.pem");
pub(crate) const SERVER_KEY: &str = include_str!("connection/testdata/server.key");
pub(crate) const CLIENT_PEM: &str = include_str!("connection/testdata/client.pem");
pub(crate) const CLIENT_KEY: &str = include_str!("connection/testdata/client.key");

/// What the fake runtime answers to a request.
pub(crate) enum Reply {
    /// A complete response.
    Full(StatusCode, String),
    /// A `200 OK` whose body sends `String` and then stays open.
    Open(String),
}

impl Reply {
    pub(crate) fn ok(body: impl Into<String>) -> Self {
        Self::Full(StatusCode::OK, body.into())
    }

    pub(crate) fn status(status: StatusCode) -> Self {
        Self::Full(status, String::new())
    }

    fn into_response(self) -> Response<BoxBody<Bytes, Infallible>> {
        match self {
            Reply::Full(status, body) => {
                let mut response = Response::new(Full::new(Bytes::from(body)).boxed());
                *response.status_mut() = status;
                response
            }
            Reply::Open(body) => {
                let frames = futures::stream::iter([Ok::<_, Infallible>(Frame::data(
                    Bytes::from(body),
                ))])
                .chain(futures::stream::pending());
                Response::new(BodyExt::boxed(StreamBody::new(frames)))
            }
        }
    }
}

type Handler = dyn Fn(&str) -> Reply + Send + Sync;

#[derive(Clone)]
struct Service {
    requests: Arc<Mutex<Vec<String>>>,
    handler: Arc<Handler>,
}

impl Service {
    async fn serve<T>(self, stream: T)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let service = service_fn(move |request: hyper::Request<Incoming>| {
            let path = request
                .uri()
                .path_and_query()
                .map_or_else(String::new, |pq| pq.as_str().to_owned());
            self.requests.lock().unwrap().push(path.clone());
            let reply = (self.handler)(&path);
            async move { Ok::<_, Infallible>(reply.into_response()) }
        });
        let _ = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await;
    }
}

enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
    Tls(String, TlsFiles),
}

pub(crate) struct FakeDaemon {
    _dir: tempfile::TempDir,
    endpoint: Endpoint,
    requests: Arc<Mutex<Vec<String>>>,
    accept_loop: tokio::task::JoinHandle<()>,
}

impl FakeDaemon {
    /// Binds a fresh unix socket and answers every request with `handler(path_and_query)`.
    pub(crate) fn start(handler: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("runtime.sock");
        let listener = UnixListener::bind(&path).expect("failed to bind fake runtime socket");
        let service = Service {
            requests: Arc::new(Mutex::new(Vec::new())),
            handler: Arc::new(handler),
        };

        let requests = Arc::clone(&service.requests);
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(service.clone().serve(stream));
            }
        });

        Self {
            _dir: dir,
            endpoint: Endpoint::Unix(path),
            requests,
            accept_loop,
        }
    }

    /// Like [`FakeDaemon::start`], but serves plain HTTP on a loopback TCP port.
    pub(crate) async fn start_tcp(handler: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        Self::start_on_tcp(handler, None).await
    }

    /// Serves HTTPS on a loopback TCP port with the test certificates and requires a
    /// client certificate signed by the test CA.
    pub(crate) async fn start_tls(handler: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        Self::start_on_tcp(handler, Some(tls_acceptor())).await
    }

    async fn start_on_tcp(
        handler: impl Fn(&str) -> Reply + Send + Sync + 'static,
        acceptor: Option<TlsAcceptor>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake runtime port");
        let port = listener.local_addr().unwrap().port();
        let service = Service {
            requests: Arc::new(Mutex::new(Vec::new())),
            handler: Arc::new(handler),
        };

        let endpoint = match acceptor {
            Some(_) => Endpoint::Tls(format!("localhost:{port}"), tls_files(dir.path())),
            None => Endpoint::Tcp(format!("127.0.0.1:{port}")),
        };
        let requests = Arc::clone(&service.requests);
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let service = service.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => {
                            if let Ok(stream) = acceptor.accept(stream).await {
                                service.serve(stream).await;
                            }
                        }
                        None => service.serve(stream).await,
                    }
                });
            }
        });

        Self {
            _dir: dir,
            endpoint,
            requests,
            accept_loop,
        }
    }

    pub(crate) fn mode(&self) -> ConnectionMode {
        match &self.endpoint {
            Endpoint::Unix(path) => ConnectionMode::Unix(path.clone()),
            Endpoint::Tcp(address) => ConnectionMode::Tcp(address.clone()),
            Endpoint::Tls(address, files) => ConnectionMode::Tls {
                address: address.clone(),
                files: files.clone(),
            },
        }
    }

    pub(crate) fn connector(&self) -> Connector {
        Connector::new(self.mode()).expect("fake runtime connector")
    }

    /// Paths requested so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// Writes the test CA and client credentials into `dir`.
pub(crate) fn tls_files(dir: &std::path::Path) -> TlsFiles {
    let write = |name: &str, contents: &str| {
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("failed to write TLS fixture");
        path
    };

    TlsFiles {
        ca: write("ca.pem", CA_PEM),
        cert: Some(write("client.pem", CLIENT_PEM)),
        key: Some(write("client.key", CLIENT_KEY)),
    }
}

fn tls_acceptor() -> TlsAcceptor {
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut CA_PEM.as_bytes()) {
        roots.add(cert.unwrap()).unwrap();
    }
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .unwrap();
    let certs = rustls_pemfile::certs(&mut SERVER_PEM.as_bytes())
        .collect::<std::io::Result<Vec<_>>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut SERVER_KEY.as_bytes())
        .unwrap()
        .unwrap();
    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

pub(crate) fn stats_record(cpu: (u64, u64), system: (u64, u64), usage: u64, limit: u64) -> String {
    serde_json::json!({
        "read": "2024-05-01T10:00:01Z",
        "cpu_stats": {
            "cpu_usage": {"total_usage": cpu.1},
            "system_cpu_usage": system.1,
            "online_cpus": 1
        },
        "precpu_stats": {
            "cpu_usage": {"total_usage": cpu.0},
            "system_cpu_usage": system.0
        },
        "memory_stats": {"usage": usage, "limit": limit},
        "networks": {"eth0": {"rx_bytes": 100, "tx_bytes": 200}}
    })
    .to_string()
}

/// A sink remembering everything it was handed.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) metrics: Mutex<Vec<crate::stats::Metric>>,
    pub(crate) cleared: Mutex<Vec<String>>,
    pub(crate) closed: std::sync::atomic::AtomicBool,
}

impl RecordingSink {
    pub(crate) fn metrics(&self) -> Vec<crate::stats::Metric> {
        self.metrics.lock().unwrap().clone()
    }

    pub(crate) fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl crate::sink::Sink for RecordingSink {
    async fn push(&self, metric: crate::stats::Metric) -> Result<(), crate::sink::Error> {
        self.metrics.lock().unwrap().push(metric);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn clear(&self, name: &crate::container::ContainerName) {
        self.cleared.lock().unwrap().push(name.to_string());
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
