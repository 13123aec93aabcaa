use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;

use super::{Connection, Connector, Error, Result};

/// A fixed set of connections lent to stats workers, plus one dedicated connection for
/// administrative queries.
///
/// The pool never grows: every connection is dialed in [`ConnectionPool::connect`] and a
/// failure there aborts construction.
#[derive(Debug)]
pub struct ConnectionPool {
    idle: Mutex<VecDeque<Connection>>,
    /// One permit per idle connection.
    available: Semaphore,
    dedicated: Connection,
    connections: Vec<Connection>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Dials `lendable` pooled connections and the dedicated one.
    ///
    /// # Errors
    ///
    /// Returns the first connection error encountered; connections dialed before it are
    /// dropped.
    pub async fn connect(connector: &Connector, lendable: usize) -> Result<Self> {
        let mut connections = Vec::with_capacity(lendable + 1);
        for id in 0..=lendable {
            connections.push(Connection::establish(id, connector.clone()).await?);
        }
        let dedicated = connections[lendable].clone();
        let idle: VecDeque<Connection> = connections[..lendable].iter().cloned().collect();
        log::debug!(
            "connected {} pooled connections and 1 dedicated connection to {}",
            lendable,
            connector
        );

        Ok(Self {
            available: Semaphore::new(idle.len()),
            idle: Mutex::new(idle),
            dedicated,
            connections,
            closed: AtomicBool::new(false),
        })
    }

    /// Borrows an idle connection, waiting until one is released if all are lent out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once [`ConnectionPool::close_all`] was called.
    pub async fn acquire(&self) -> Result<Connection> {
        let permit = self.available.acquire().await.map_err(|_| Error::Closed)?;
        permit.forget();
        self.lock_idle().pop_front().ok_or(Error::Closed)
    }

    /// Returns a connection obtained from [`ConnectionPool::acquire`]. Never blocks.
    ///
    /// Connections released after the pool was closed are discarded.
    pub fn release(&self, connection: Connection) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.lock_idle().push_back(connection);
        self.available.add_permits(1);
    }

    /// The connection reserved for list and inspect queries.
    pub fn dedicated(&self) -> &Connection {
        &self.dedicated
    }

    /// Total number of connections, including the dedicated one.
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Number of connections currently available to [`ConnectionPool::acquire`].
    pub fn available(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.available.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every connection, lent or idle. Calling it again has no effect.
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.available.close();
        self.lock_idle().clear();
        for connection in &self.connections {
            connection.close().await;
        }
        log::debug!("closed {} connections", self.connections.len());
    }

    fn lock_idle(&self) -> MutexGuard<'_, VecDeque<Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
