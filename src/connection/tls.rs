use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::{Error, Result};

/// PEM files used to secure a TCP connection to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// CA bundle the runtime's certificate is verified against.
    pub ca: PathBuf,
    /// Client certificate chain, required together with `key` by runtimes that verify clients.
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

pub(super) fn client_config(files: &TlsFiles) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let ca_certs = read_certs(&files.ca)?;
    if ca_certs.is_empty() {
        return Err(Error::NoCertificates(files.ca.clone()));
    }
    for cert in ca_certs {
        roots.add(cert).map_err(Error::Tls)?;
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match (&files.cert, &files.key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(read_certs(cert)?, read_key(key)?)
            .map_err(Error::Tls)?,
        (None, None) => builder.with_no_client_auth(),
        _ => return Err(Error::IncompleteClientAuth),
    };

    Ok(config)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| Error::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(BufReader::new(file))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|source| Error::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| Error::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| Error::NoPrivateKey(path.to_path_buf()))
}
