//! Backend sinks
//!
//! A [`Connector`] hands out one [`BatchWriter`] per worker. Writers are
//! never shared between workers. Each backend also declares the lifecycle
//! rules the worker applies to its writers, such as how often the connection
//! is cycled.

use async_trait::async_trait;
use pagehits_common::types::Record;

use crate::error::SinkError;

pub mod relational;
pub mod wide_column;

pub use relational::{MySqlBatchWriter, MySqlConnector};
pub use wide_column::{DynamoDbBatchWriter, DynamoDbConnector};

/// Writes batches of records to a backend over one exclusive connection.
#[async_trait]
pub trait BatchWriter: Send + 'static {
    /// Persist `records` as a single write operation.
    ///
    /// Callers pass between 1 and the configured batch size records.
    async fn write_batch(&mut self, records: &[Record]) -> Result<(), SinkError>;
}

/// Opens and closes per-worker writers for one backend.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Writer: BatchWriter;

    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    async fn open(&self) -> Result<Self::Writer, SinkError>;

    async fn close(&self, writer: Self::Writer) -> Result<(), SinkError> {
        drop(writer);
        Ok(())
    }

    /// Cycle the writer after this many processed records.
    fn reconnect_every(&self) -> Option<usize> {
        None
    }

    /// Worker count used when the caller does not choose one.
    fn default_workers(&self) -> usize {
        1
    }

    /// Alignment applied when the caller does not request a limit.
    /// See [`resolve_limit`](crate::partition::resolve_limit).
    fn default_limit_alignment(&self) -> Option<usize> {
        None
    }

    /// Largest batch a single write may carry.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}
