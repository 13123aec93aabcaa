//! Environment configuration of the `creo-poller` binary.
//!
//! | variable                           | default                | meaning                      |
//! |------------------------------------|------------------------|------------------------------|
//! | `CREO_POLLER_MODE`                 | `unix`                 | `unix`, `tcp` or `tls`       |
//! | `CREO_POLLER_ADDRESS`              | `/var/run/docker.sock` | socket path or `host:port`   |
//! | `CREO_POLLER_TLS_CA`               |                        | CA bundle, required for tls  |
//! | `CREO_POLLER_TLS_CERT`             |                        | client certificate           |
//! | `CREO_POLLER_TLS_KEY`              |                        | client private key           |
//! | `CREO_POLLER_WORKERS`              | `4`                    | stats workers                |
//! | `CREO_POLLER_INTERVAL_SECS`        | `5`                    | polling interval             |
//! | `CREO_POLLER_REQUEST_TIMEOUT_SECS` | `10`                   | bound of one stats request   |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::connection::{ConnectionMode, TlsFiles};
use crate::poller::PollerOptions;

const DEFAULT_UNIX_SOCKET: &str = "/var/run/docker.sock";
const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

const MODE: &str = "CREO_POLLER_MODE";
const ADDRESS: &str = "CREO_POLLER_ADDRESS";
const TLS_CA: &str = "CREO_POLLER_TLS_CA";
const TLS_CERT: &str = "CREO_POLLER_TLS_CERT";
const TLS_KEY: &str = "CREO_POLLER_TLS_KEY";
const WORKERS: &str = "CREO_POLLER_WORKERS";
const INTERVAL_SECS: &str = "CREO_POLLER_INTERVAL_SECS";
const REQUEST_TIMEOUT_SECS: &str = "CREO_POLLER_REQUEST_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{variable}`: {reason}")]
    Invalid {
        variable: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("`{0}` must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: ConnectionMode,
    pub interval: Duration,
    pub options: PollerOptions,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let lookup = |variable: &str| lookup(variable).filter(|value| !value.trim().is_empty());

        let mode = match lookup(MODE).as_deref().map(str::trim) {
            None | Some("unix") => ConnectionMode::Unix(PathBuf::from(
                lookup(ADDRESS).unwrap_or_else(|| DEFAULT_UNIX_SOCKET.to_owned()),
            )),
            Some("tcp") => ConnectionMode::Tcp(lookup(ADDRESS).ok_or(Error::Missing(ADDRESS))?),
            Some("tls") => ConnectionMode::Tls {
                address: lookup(ADDRESS).ok_or(Error::Missing(ADDRESS))?,
                files: TlsFiles {
                    ca: lookup(TLS_CA).map(PathBuf::from).ok_or(Error::Missing(TLS_CA))?,
                    cert: lookup(TLS_CERT).map(PathBuf::from),
                    key: lookup(TLS_KEY).map(PathBuf::from),
                },
            },
            Some(other) => {
                return Err(Error::Invalid {
                    variable: MODE,
                    value: other.to_owned(),
                    reason: "expected `unix`, `tcp` or `tls`",
                });
            }
        };

        let workers = parse(lookup(WORKERS), WORKERS, DEFAULT_WORKERS)?;
        let interval = parse(lookup(INTERVAL_SECS), INTERVAL_SECS, DEFAULT_INTERVAL_SECS)?;
        let request_timeout = parse(
            lookup(REQUEST_TIMEOUT_SECS),
            REQUEST_TIMEOUT_SECS,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        Ok(Self {
            mode,
            interval: Duration::from_secs(interval),
            options: PollerOptions {
                workers,
                request_timeout: Duration::from_secs(request_timeout),
            },
        })
    }
}

/// Parses a positive number, using `default` if unset.
fn parse<T>(value: Option<String>, variable: &'static str, default: T) -> Result<T, Error>
where
    T: FromStr + PartialOrd + From<u8>,
{
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed >= T::from(1) => Ok(parsed),
        Ok(_) => Err(Error::Invalid {
            variable,
            value,
            reason: "must be at least 1",
        }),
        Err(_) => Err(Error::Invalid {
            variable,
            value,
            reason: "not a number",
        }),
    }
}
