//! Deferred Writer
//!
//! `set` never touches a backend itself. It enqueues one job on an unbounded
//! channel and a single background task applies jobs in call order. The
//! caller keeps a [`PendingWrite`] that resolves once its job has run,
//! whether or not a physical write happened. Backend calls of a job run on
//! the blocking pool so file-backed stores never stall the runtime.

use crate::cache::entry::CacheEntry;
use crate::cache::manager::CacheCore;
use crate::cache::options::StorageOptions;
use crate::cache::tier::StorageType;
use crate::error::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// What a completed write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was stored in every targeted backend
    Written,
    /// The stored value already hashed equal; nothing was written
    Unchanged,
}

/// Unit of work for the writer task
pub(crate) enum WriteJob {
    Write {
        entry: CacheEntry,
        storage_type: StorageType,
        options: Arc<StorageOptions>,
        done: oneshot::Sender<Result<WriteOutcome>>,
    },
    /// Resolves once every job queued before it has run
    Flush { done: oneshot::Sender<()> },
}

/// Completion handle returned by `set`
#[must_use = "the write runs regardless, but its outcome is only observable by awaiting"]
#[derive(Debug)]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<WriteOutcome>>,
}

impl PendingWrite {
    pub(crate) fn new(rx: oneshot::Receiver<Result<WriteOutcome>>) -> Self {
        Self { rx }
    }
}

impl Future for PendingWrite {
    type Output = Result<WriteOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Internal(
                "writer stopped before the write completed".into(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Start the writer task for a cache
pub(crate) fn spawn(core: Arc<CacheCore>) -> Result<mpsc::UnboundedSender<WriteJob>> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        Error::Configuration("client cache must be created inside a tokio runtime".into())
    })?;

    let (tx, rx) = mpsc::unbounded_channel();
    handle.spawn(run(core, rx));
    Ok(tx)
}

async fn run(core: Arc<CacheCore>, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
    debug!("Cache writer started");

    while let Some(job) = rx.recv().await {
        match job {
            WriteJob::Write {
                entry,
                storage_type,
                options,
                done,
            } => {
                let key = entry.storage_key.clone();
                // Backends block on I/O; jobs still run one at a time
                let job_core = core.clone();
                let result = tokio::task::spawn_blocking(move || {
                    job_core.apply_write(&entry, storage_type, &options)
                })
                .await
                .unwrap_or_else(|e| Err(Error::Internal(format!("cache write task failed: {e}"))));

                if let Err(e) = &result {
                    warn!(key = %key, tier = %storage_type, error = %e, "Cache write failed");
                    core.write_failed(&key, storage_type, e);
                }
                // The caller may have dropped its handle
                let _ = done.send(result);
            }
            WriteJob::Flush { done } => {
                let _ = done.send(());
            }
        }
    }

    debug!("Cache writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_pending_write_resolves_with_result() {
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(WriteOutcome::Unchanged)).unwrap();

        let outcome = tokio_test::block_on(PendingWrite::new(rx)).unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
    }

    #[test]
    fn test_pending_write_dropped_sender() {
        let (tx, rx) = oneshot::channel::<Result<WriteOutcome>>();
        drop(tx);

        assert_matches!(
            tokio_test::block_on(PendingWrite::new(rx)),
            Err(Error::Internal(_))
        );
    }
}
