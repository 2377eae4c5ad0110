//! Load worker
//!
//! A worker owns one partition and one writer. It walks the partition in
//! ascending batches, cycles its connection when the backend asks for it, and
//! reports exactly one [`WorkerResult`] when it finishes.
//!
//! Failure handling:
//! - Opening or re-opening the connection fails: the worker stops and reports
//!   [`LoadError::Connection`].
//! - A batch write fails: the batch is logged with its full content and
//!   counted in [`WorkerStats`]. Under [`BatchErrorPolicy::FailWorker`] the
//!   worker stops with [`LoadError::BatchFailed`]; otherwise it continues.
//! - The cancellation token fires: an in-flight write or connection attempt
//!   is abandoned and the worker reports [`LoadError::Cancelled`].

use std::sync::Arc;

use pagehits_common::types::Record;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::segmented_batches;
use crate::config::BatchErrorPolicy;
use crate::error::{LoadError, Result};
use crate::partition::Partition;
use crate::sink::{BatchWriter, Connector};

/// Counters for one worker's run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub batches_written: u64,
    pub batches_failed: u64,
    pub records_written: u64,
    pub records_failed: u64,
    pub reconnects: u64,
}

/// The single terminal report of a worker.
#[derive(Debug)]
pub struct WorkerResult {
    pub worker_id: usize,
    pub partition: Partition,
    pub stats: WorkerStats,
    pub error: Option<LoadError>,
}

impl WorkerResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Writes one partition through one backend connection.
pub struct Worker<C: Connector> {
    id: usize,
    partition: Partition,
    records: Arc<[Record]>,
    connector: Arc<C>,
    batch_size: usize,
    on_batch_error: BatchErrorPolicy,
    cancel: CancellationToken,
}

impl<C: Connector> Worker<C> {
    pub fn new(
        partition: Partition,
        records: Arc<[Record]>,
        connector: Arc<C>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: partition.index,
            partition,
            records,
            connector,
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            on_batch_error: BatchErrorPolicy::default(),
            cancel,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_batch_error_policy(mut self, policy: BatchErrorPolicy) -> Self {
        self.on_batch_error = policy;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run to completion and report the outcome.
    pub async fn run(self) -> WorkerResult {
        let mut stats = WorkerStats::default();
        let error = self.load(&mut stats).await.err();

        match &error {
            None => info!(
                worker_id = self.id,
                records_written = stats.records_written,
                records_failed = stats.records_failed,
                batches_failed = stats.batches_failed,
                reconnects = stats.reconnects,
                "Worker finished"
            ),
            Some(e) if e.is_cancelled() => warn!(
                worker_id = self.id,
                records_written = stats.records_written,
                "Worker cancelled"
            ),
            Some(e) => error!(
                worker_id = self.id,
                records_written = stats.records_written,
                error = %e,
                "Worker failed"
            ),
        }

        WorkerResult {
            worker_id: self.id,
            partition: self.partition,
            stats,
            error,
        }
    }

    async fn load(&self, stats: &mut WorkerStats) -> Result<()> {
        info!(
            worker_id = self.id,
            start = self.partition.start,
            end = self.partition.end,
            backend = self.connector.name(),
            "Worker started"
        );

        if self.partition.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        let mut writer = self.open().await?;
        let mut since_open = 0usize;

        // Batches never straddle a reconnect boundary.
        let segment_len = self.connector.reconnect_every().unwrap_or(usize::MAX);

        for batch in segmented_batches(&self.records, self.partition, self.batch_size, segment_len) {
            if self.cancel.is_cancelled() {
                self.release(writer).await;
                return Err(LoadError::Cancelled);
            }

            if let Some(every) = self.connector.reconnect_every() {
                if since_open >= every {
                    debug!(
                        worker_id = self.id,
                        offset = batch.offset - self.partition.start,
                        "Re-opening connection"
                    );
                    self.release(writer).await;
                    writer = self.open().await?;
                    stats.reconnects += 1;
                    since_open = 0;
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = writer.write_batch(batch.records) => Some(result),
            };

            let Some(result) = outcome else {
                self.release(writer).await;
                return Err(LoadError::Cancelled);
            };

            since_open += batch.len();
            let len = batch.len() as u64;

            match result {
                Ok(()) => {
                    stats.batches_written += 1;
                    stats.records_written += len;
                },
                Err(e) => {
                    stats.batches_failed += 1;
                    stats.records_failed += len;
                    error!(
                        worker_id = self.id,
                        index = batch.offset,
                        error = %e,
                        batch = %batch.payload(),
                        "Batch write failed"
                    );

                    if self.on_batch_error == BatchErrorPolicy::FailWorker {
                        self.release(writer).await;
                        return Err(LoadError::BatchFailed {
                            worker_id: self.id,
                            failed_batches: stats.batches_failed,
                        });
                    }
                },
            }
        }

        self.release(writer).await;
        Ok(())
    }

    /// Open a writer, giving up as soon as the load is cancelled.
    async fn open(&self) -> Result<C::Writer> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LoadError::Cancelled),
            opened = self.connector.open() => opened.map_err(|source| LoadError::Connection {
                worker_id: self.id,
                source,
            }),
        }
    }

    /// Close errors are logged and otherwise ignored.
    async fn release(&self, writer: C::Writer) {
        if let Err(e) = self.connector.close(writer).await {
            error!(worker_id = self.id, error = %e, "Error while closing connection");
        }
    }
}
