use std::path::PathBuf;
use std::sync::Arc;
use std::{fmt, pin, task};

use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;

use super::tls::TlsFiles;
use super::{Error, Result};

/// Default authority sent in the `Host` header over unix sockets.
const UNIX_AUTHORITY: &str = "localhost";

/// How to reach the runtime's API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// A local unix domain socket, e.g. `/var/run/docker.sock`.
    Unix(PathBuf),
    /// Plain HTTP over TCP to `host:port`.
    Tcp(String),
    /// HTTPS to `host:port`, verified against the given CA bundle.
    Tls { address: String, files: TlsFiles },
}

pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedIo = TokioIo<Box<dyn Io>>;

#[derive(Clone)]
enum Transport {
    Unix(PathBuf),
    Tcp,
    Tls {
        connector: TlsConnector,
        server_name: ServerName<'static>,
    },
}

/// Dials new transport streams for a [`ConnectionMode`].
///
/// All configuration (address parsing, TLS material) is resolved once in
/// [`Connector::new`]; dialing afterwards only performs I/O.
#[derive(Clone)]
pub struct Connector {
    transport: Arc<Transport>,
    endpoint: hyper::Uri,
}

impl Connector {
    /// Resolves `mode` into a connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for addresses that are not `host:port`, and
    /// [`Error::TlsMaterial`] or [`Error::Tls`] if the TLS files cannot be loaded.
    pub fn new(mode: ConnectionMode) -> Result<Self> {
        let (transport, endpoint) = match mode {
            ConnectionMode::Unix(path) => (
                Transport::Unix(path),
                hyper::Uri::from_static("http://localhost"),
            ),
            ConnectionMode::Tcp(address) => (Transport::Tcp, parse_endpoint("http", &address)?),
            ConnectionMode::Tls { address, files } => {
                let endpoint = parse_endpoint("https", &address)?;
                let host = endpoint.host().unwrap_or_default();
                let server_name = ServerName::try_from(host.trim_matches(['[', ']']).to_owned())
                    .map_err(|_| Error::InvalidAddress(address.clone()))?;
                let config = super::tls::client_config(&files)?;
                (
                    Transport::Tls {
                        connector: TlsConnector::from(Arc::new(config)),
                        server_name,
                    },
                    endpoint,
                )
            }
        };

        Ok(Self {
            transport: Arc::new(transport),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &hyper::Uri {
        &self.endpoint
    }

    /// Value for the `Host` header of requests sent through this connector.
    pub fn authority(&self) -> &str {
        self.endpoint
            .authority()
            .map_or(UNIX_AUTHORITY, |authority| authority.as_str())
    }
}

fn parse_endpoint(scheme: &str, address: &str) -> Result<hyper::Uri> {
    let endpoint: hyper::Uri = format!("{scheme}://{address}")
        .parse()
        .map_err(|_| Error::InvalidAddress(address.to_owned()))?;
    let valid = endpoint.path() == "/"
        && endpoint.host().is_some_and(|host| !host.is_empty())
        && endpoint.port().is_some();
    if !valid {
        return Err(Error::InvalidAddress(address.to_owned()));
    }

    Ok(endpoint)
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("endpoint", &self.to_string())
            .finish()
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport.as_ref() {
            Transport::Unix(path) => write!(f, "unix://{}", path.display()),
            Transport::Tcp | Transport::Tls { .. } => write!(f, "{}", self.endpoint),
        }
    }
}

impl tower::Service<hyper::Uri> for Connector {
    type Response = BoxedIo;

    type Error = std::io::Error;

    type Future =
        pin::Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: hyper::Uri) -> Self::Future {
        let transport = Arc::clone(&self.transport);
        Box::pin(async move {
            let io: Box<dyn Io> = match transport.as_ref() {
                Transport::Unix(path) => Box::new(tokio::net::UnixStream::connect(path).await?),
                Transport::Tcp => Box::new(tcp_connect(&uri).await?),
                Transport::Tls {
                    connector,
                    server_name,
                } => {
                    let stream = tcp_connect(&uri).await?;
                    Box::new(connector.connect(server_name.clone(), stream).await?)
                }
            };

            Ok(TokioIo::new(io))
        })
    }
}

async fn tcp_connect(uri: &hyper::Uri) -> std::io::Result<tokio::net::TcpStream> {
    let authority = uri.authority().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "endpoint without authority")
    })?;
    let stream = tokio::net::TcpStream::connect(authority.as_str()).await?;
    stream.set_nodelay(true)?;

    Ok(stream)
}
