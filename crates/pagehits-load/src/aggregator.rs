//! Completion aggregator
//!
//! Collects exactly one [`WorkerResult`] per worker and reduces them into a
//! single outcome. The channel is sized to the worker count, so a worker's
//! final send never blocks. On the first worker error the shared cancellation
//! token is fired so the remaining workers stop early, but their results are
//! still drained and their tasks joined before the aggregator returns.

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{LoadError, Result};
use crate::worker::{WorkerResult, WorkerStats};

/// Totals over every worker of a load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub workers: usize,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub records_written: u64,
    pub records_failed: u64,
    pub reconnects: u64,
}

impl Totals {
    fn absorb(&mut self, stats: &WorkerStats) {
        self.workers += 1;
        self.batches_written += stats.batches_written;
        self.batches_failed += stats.batches_failed;
        self.records_written += stats.records_written;
        self.records_failed += stats.records_failed;
        self.reconnects += stats.reconnects;
    }
}

/// Create the result channel for `worker_count` workers.
pub fn channel(
    worker_count: usize,
) -> (mpsc::Sender<WorkerResult>, mpsc::Receiver<WorkerResult>) {
    mpsc::channel(worker_count.max(1))
}

/// Caller-side collector for worker results.
pub struct Aggregator {
    expected: usize,
    results: mpsc::Receiver<WorkerResult>,
    cancel: CancellationToken,
}

impl Aggregator {
    pub fn new(
        expected: usize,
        results: mpsc::Receiver<WorkerResult>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            expected,
            results,
            cancel,
        }
    }

    /// Receive every result, join every task, and reduce.
    ///
    /// Returns the first error reported by a worker, ignoring cancellations
    /// that the aggregator itself triggered. The sender side must have been
    /// dropped by the caller so that a worker that dies without reporting
    /// cannot stall collection.
    pub async fn collect(mut self, tasks: Vec<(usize, JoinHandle<()>)>) -> Result<Totals> {
        let mut totals = Totals::default();
        let mut first_error: Option<LoadError> = None;
        let mut cancellations = 0usize;
        let mut received = 0usize;

        while received < self.expected {
            let Some(result) = self.results.recv().await else {
                break;
            };
            received += 1;
            totals.absorb(&result.stats);

            debug!(
                worker_id = result.worker_id,
                ok = result.is_ok(),
                received = received,
                expected = self.expected,
                "Worker completion event"
            );

            match result.error {
                None => {},
                Some(LoadError::Cancelled) => cancellations += 1,
                Some(e) => {
                    if first_error.is_none() {
                        warn!(
                            worker_id = result.worker_id,
                            error = %e,
                            "Worker failed, cancelling remaining workers"
                        );
                        self.cancel.cancel();
                        first_error = Some(e);
                    }
                },
            }
        }

        let joined = join_all(
            tasks
                .into_iter()
                .map(|(worker_id, task)| async move { (worker_id, task.await) }),
        )
        .await;

        for (worker_id, outcome) in joined {
            if let Err(e) = outcome {
                error!(worker_id = worker_id, error = %e, "Worker task did not complete");
                self.cancel.cancel();
                if first_error.is_none() {
                    first_error = Some(LoadError::WorkerPanicked {
                        worker_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        if received < self.expected {
            return Err(LoadError::MissingResults {
                expected: self.expected,
                missing: self.expected - received,
            });
        }

        if cancellations > 0 {
            return Err(LoadError::Cancelled);
        }

        Ok(totals)
    }
}
