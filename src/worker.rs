//! A fixed set of workers draining a bounded queue.
//!
//! Items sent to a [`WorkerPool`] are handed to exactly one worker, which runs them through a
//! shared [`Processor`]. Failures go to [`Processor::on_error`] and never stop a worker.
//! [`WorkerPool::close`] stops accepting items and waits until everything already queued has
//! been processed.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("worker pool is closed")]
    Closed,
}

/// The callbacks run by every worker.
///
/// One instance is shared by all workers, so `process` runs concurrently with itself.
pub trait Processor<T>: Send + Sync + 'static {
    type Error: Send;

    fn process(&self, item: T) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn on_error(&self, error: Self::Error);
}

#[derive(Debug)]
pub struct WorkerPool<T> {
    sender: Mutex<Option<mpsc::Sender<T>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<T> WorkerPool<T>
where
    T: Send + 'static,
{
    /// Spawns `workers` workers on the current runtime, sharing a queue of the same capacity.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero.
    pub fn new<P>(workers: usize, processor: Arc<P>) -> Self
    where
        P: Processor<T>,
    {
        assert!(workers > 0, "a worker pool needs at least one worker");
        let (sender, receiver) = mpsc::channel(workers);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(work(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&processor),
                ))
            })
            .collect();
        log::debug!("started {} workers", workers);

        Self {
            sender: Mutex::new(Some(sender)),
            workers: tokio::sync::Mutex::new(handles),
        }
    }

    /// Queues an item, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once [`WorkerPool::close`] was called; the item is dropped.
    pub async fn send(&self, item: T) -> Result<(), Error> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Closed)?;
        sender.send(item).await.map_err(|_| Error::Closed)
    }

    /// Stops accepting items and waits until every queued item has been processed.
    ///
    /// Items whose [`WorkerPool::send`] was already waiting for queue space are processed
    /// too. Calling `close` again returns immediately.
    pub async fn close(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(err) = handle.await {
                log::error!("worker terminated abnormally: {}", err);
            }
        }
    }
}

async fn work<T, P>(id: usize, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>, processor: Arc<P>)
where
    P: Processor<T>,
{
    loop {
        let item = receiver.lock().await.recv().await;
        let Some(item) = item else {
            break;
        };
        match AssertUnwindSafe(processor.process(item))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => processor.on_error(err),
            Err(_) => log::error!("worker #{} recovered from a panic while processing", id),
        }
    }
    log::trace!("worker #{} stopped", id);
}
