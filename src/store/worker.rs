use anyhow::Result;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use super::TripStore;
use crate::record::TripRecord;

/// Background writer feeding records into one or more stores.
///
/// `submit` never waits: if the queue is full or the worker is gone the record
/// is dropped with a warning. Store failures are logged and swallowed.
pub struct PersistenceWorker {
    tx: mpsc::Sender<TripRecord>,
    handle: JoinHandle<()>,
}

impl PersistenceWorker {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(stores: Vec<Box<dyn TripStore>>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let backends: Vec<_> = stores.iter().map(|s| s.backend_type()).collect();
        info!(?backends, capacity, "Persistence worker starting");

        let span = tracing::info_span!("persistence");
        let handle = tokio::spawn(run(stores, rx).instrument(span));

        Self { tx, handle }
    }

    /// Queues a record for storage without blocking.
    ///
    /// Returns `false` when the record was dropped.
    pub fn submit(&self, record: TripRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Persistence queue full, dropping trip record");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Persistence worker stopped, dropping trip record");
                false
            }
        }
    }

    /// Stops accepting records and waits for the queued ones to be written.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.tx);
        self.handle.await?;
        Ok(())
    }
}

async fn run(mut stores: Vec<Box<dyn TripStore>>, mut rx: mpsc::Receiver<TripRecord>) {
    let mut written = 0usize;

    while let Some(record) = rx.recv().await {
        for store in stores.iter_mut() {
            if let Err(e) = store.insert(&record).await {
                error!(backend = store.backend_type(), error = %e, "Failed to persist trip record");
            }
        }
        written += 1;
    }

    for store in stores.iter_mut() {
        if let Err(e) = store.flush().await {
            error!(backend = store.backend_type(), error = %e, "Failed to flush trip store");
        }
    }
    debug!(written, "Persistence worker drained");
}
