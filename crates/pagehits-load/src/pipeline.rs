//! Load pipeline
//!
//! [`Pipeline`] fans a record set out to one worker per partition and fans
//! the results back in. [`Loader`] adds the record source and backend
//! construction on top, and [`load`] is the one-call entry point.

use std::sync::Arc;

use pagehits_common::types::Record;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::aggregator::{self, Aggregator, Totals};
use crate::config::{Backend, BatchErrorPolicy, LoadConfig, DEFAULT_BATCH_SIZE};
use crate::error::{LoadError, Result};
use crate::partition::{resolve_limit, PartitionPlan};
use crate::sink::{Connector, DynamoDbConnector, MySqlConnector};
use crate::source::{PagecountsFile, RecordSource};
use crate::worker::Worker;

/// Knobs for a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Requested record count; 0 means "use the backend default".
    pub limit: usize,
    /// Overrides the connector's default worker count
    pub workers: Option<usize>,
    pub batch_size: usize,
    pub on_batch_error: BatchErrorPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            workers: None,
            batch_size: DEFAULT_BATCH_SIZE,
            on_batch_error: BatchErrorPolicy::default(),
        }
    }
}

impl PipelineOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// Outcome of a successful load.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub backend: String,
    pub workers: usize,
    pub records_available: usize,
    /// Limit after resolving defaults and clamping
    pub limit: usize,
    pub records_assigned: usize,
    /// Trailing records below the limit that no partition covered
    pub records_dropped: usize,
    pub records_written: u64,
    pub records_failed: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub reconnects: u64,
}

impl LoadSummary {
    fn new(backend: &str, available: usize, plan: &PartitionPlan, totals: Totals) -> Self {
        Self {
            backend: backend.to_string(),
            workers: totals.workers,
            records_available: available,
            limit: plan.limit,
            records_assigned: plan.assigned(),
            records_dropped: plan.dropped(),
            records_written: totals.records_written,
            records_failed: totals.records_failed,
            batches_written: totals.batches_written,
            batches_failed: totals.batches_failed,
            reconnects: totals.reconnects,
        }
    }
}

/// Partitioned fan-out over an in-memory record set.
#[derive(Debug, Clone)]
pub struct Pipeline {
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token; cancelling it stops every run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Load `records` through `connector`, one worker per partition.
    pub async fn run<C: Connector>(
        &self,
        records: Arc<[Record]>,
        connector: Arc<C>,
    ) -> Result<LoadSummary> {
        let worker_count = self.options.workers.unwrap_or_else(|| connector.default_workers());
        if worker_count == 0 {
            return Err(LoadError::Config("Worker count must be greater than 0".to_string()));
        }

        let batch_size = self.options.batch_size;
        if batch_size == 0 {
            return Err(LoadError::Config("Batch size must be greater than 0".to_string()));
        }
        if let Some(max) = connector.max_batch_size() {
            if batch_size > max {
                return Err(LoadError::Config(format!(
                    "Batch size {} exceeds the {} limit of {} records per request",
                    batch_size,
                    connector.name(),
                    max
                )));
            }
        }

        let available = records.len();
        let limit = resolve_limit(
            available,
            self.options.limit,
            connector.default_limit_alignment(),
        );
        let plan = PartitionPlan::new(available, limit, worker_count);

        info!(
            backend = connector.name(),
            records_available = available,
            limit = plan.limit,
            workers = worker_count,
            subset = plan.subset,
            batch_size = batch_size,
            "Starting load"
        );

        if plan.dropped() > 0 {
            warn!(
                dropped = plan.dropped(),
                limit = plan.limit,
                workers = worker_count,
                "Limit is not a multiple of the worker count; trailing records will not be loaded"
            );
        }

        // A child token so the aggregator's cancellation stays local to this run.
        let cancel = self.cancel.child_token();
        let (tx, rx) = aggregator::channel(worker_count);
        let mut tasks = Vec::with_capacity(worker_count);

        for partition in plan.partitions.iter().copied() {
            let worker = Worker::new(
                partition,
                Arc::clone(&records),
                Arc::clone(&connector),
                cancel.clone(),
            )
            .with_batch_size(batch_size)
            .with_batch_error_policy(self.options.on_batch_error);

            let tx = tx.clone();
            let span = info_span!("worker", worker_id = partition.index);
            let handle = tokio::spawn(
                async move {
                    let result = worker.run().await;
                    // Capacity equals the worker count, so this never waits.
                    let _ = tx.send(result).await;
                }
                .instrument(span),
            );
            tasks.push((partition.index, handle));
        }
        drop(tx);

        let totals = Aggregator::new(worker_count, rx, cancel).collect(tasks).await?;
        let summary = LoadSummary::new(connector.name(), available, &plan, totals);

        info!(
            backend = %summary.backend,
            records_written = summary.records_written,
            records_failed = summary.records_failed,
            records_dropped = summary.records_dropped,
            reconnects = summary.reconnects,
            "Load complete"
        );

        Ok(summary)
    }
}

/// Reads a source and loads it into the chosen backend.
pub struct Loader<S: RecordSource = PagecountsFile> {
    config: LoadConfig,
    source: S,
    cancel: CancellationToken,
}

impl Loader<PagecountsFile> {
    pub fn new(config: LoadConfig) -> Self {
        Self {
            config,
            source: PagecountsFile::new(),
            cancel: CancellationToken::new(),
        }
    }
}

impl<S: RecordSource> Loader<S> {
    pub fn with_source<T: RecordSource>(self, source: T) -> Loader<T> {
        Loader {
            config: self.config,
            source,
            cancel: self.cancel,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Load up to `limit` records from `source_id` into `backend`.
    ///
    /// `connection_target` is a MySQL URL for [`Backend::Relational`] and an
    /// AWS region for [`Backend::WideColumn`]. An empty target falls back to
    /// the configured connection settings.
    pub async fn load(
        &self,
        source_id: &str,
        limit: usize,
        backend: Backend,
        connection_target: &str,
    ) -> Result<LoadSummary> {
        self.config
            .validate()
            .map_err(|e| LoadError::Config(e.to_string()))?;

        let records: Arc<[Record]> = self.source.load(source_id).await?.into();

        let pipeline = Pipeline::new(PipelineOptions {
            limit,
            workers: self.config.workers,
            batch_size: self.config.batch_size,
            on_batch_error: self.config.on_batch_error,
        })
        .with_cancellation(self.cancel.clone());

        match backend {
            Backend::Relational => {
                let dsn = if connection_target.is_empty() {
                    self.config.mysql_dsn()
                } else {
                    connection_target.to_string()
                };
                let connector = MySqlConnector::new(dsn)
                    .with_table(&self.config.relational.table)
                    .with_reconnect_every(self.config.relational.reconnect_every);
                pipeline.run(records, Arc::new(connector)).await
            },
            Backend::WideColumn => {
                let mut wide_column = self.config.wide_column.clone();
                if !connection_target.is_empty() {
                    wide_column.region = connection_target.to_string();
                }
                let connector = DynamoDbConnector::connect(&wide_column).await;
                pipeline.run(records, Arc::new(connector)).await
            },
        }
    }
}

/// Load a page-count file with default settings.
pub async fn load(
    source_id: &str,
    limit: usize,
    backend: Backend,
    connection_target: &str,
) -> Result<LoadSummary> {
    Loader::new(LoadConfig::default())
        .load(source_id, limit, backend, connection_target)
        .await
}
