use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid runtime address `{0}`, expected `host:port`")]
    InvalidAddress(String),
    #[error("failed to load TLS material from `{path}`: {source}")]
    TlsMaterial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in `{0}`")]
    NoCertificates(PathBuf),
    #[error("no private key found in `{0}`")]
    NoPrivateKey(PathBuf),
    #[error("client certificate and key must be configured together")]
    IncompleteClientAuth,
    #[error("invalid TLS configuration: {0}")]
    Tls(#[source] tokio_rustls::rustls::Error),
    #[error("failed to connect to `{endpoint}`: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP handshake with `{endpoint}` failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: hyper::Error,
    },
    #[error("failed to build request for `{path}`: {source}")]
    Request {
        path: String,
        #[source]
        source: hyper::http::Error,
    },
    #[error("request to `{path}` failed: {source}")]
    Http {
        path: String,
        #[source]
        source: hyper::Error,
    },
    #[error("connection is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
