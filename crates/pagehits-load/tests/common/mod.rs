//! Shared test utilities for pipeline integration tests
//!
//! [`RecordingConnector`] stands in for a real backend. It records every
//! batch it is asked to write, tracks how many writers are alive, and can be
//! told to fail connections or to never finish a connection or a write.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pagehits_common::types::Record;
use pagehits_load::{BatchWriter, Connector, SinkError};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pagehits_load=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// `n` records whose page name carries their index.
pub fn records(n: usize) -> Arc<[Record]> {
    (0..n)
        .map(|i| Record::new("en", format!("Page_{}", i), i as i64, 100))
        .collect::<Vec<_>>()
        .into()
}

/// Index encoded by [`records`].
pub fn index_of(record: &Record) -> usize {
    record
        .page
        .trim_start_matches("Page_")
        .parse()
        .unwrap_or(usize::MAX)
}

#[derive(Debug, Default)]
pub struct Recorded {
    /// Record indexes of every successful batch, in write order
    pub batches: Mutex<Vec<Vec<usize>>>,
    pub opens: AtomicUsize,
    pub live_writers: AtomicUsize,
}

impl Recorded {
    pub fn written(&self) -> Vec<usize> {
        let mut all: Vec<usize> = self.batches.lock().unwrap().iter().flatten().copied().collect();
        all.sort_unstable();
        all
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn live_writers(&self) -> usize {
        self.live_writers.load(Ordering::SeqCst)
    }
}

/// Which `open` calls fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    Never,
    /// Only the first open across all workers
    First,
    Always,
}

#[derive(Debug)]
pub struct RecordingConnector {
    pub recorded: Arc<Recorded>,
    pub open_failure: OpenFailure,
    /// Writes never complete; only cancellation ends them
    pub hang_writes: bool,
    /// Opens that do not fail never complete either
    pub hang_opens: bool,
    pub default_workers: usize,
    pub limit_alignment: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub reconnect_every: Option<usize>,
}

impl Default for RecordingConnector {
    fn default() -> Self {
        Self {
            recorded: Arc::new(Recorded::default()),
            open_failure: OpenFailure::Never,
            hang_writes: false,
            hang_opens: false,
            default_workers: 8,
            limit_alignment: None,
            max_batch_size: None,
            reconnect_every: None,
        }
    }
}

impl RecordingConnector {
    /// Mirrors the DynamoDB connector's lifecycle rules.
    pub fn wide_column() -> Self {
        Self {
            default_workers: 1,
            limit_alignment: Some(8),
            max_batch_size: Some(25),
            ..Self::default()
        }
    }
}

pub struct RecordingWriter {
    recorded: Arc<Recorded>,
    hang: bool,
}

impl Drop for RecordingWriter {
    fn drop(&mut self) {
        self.recorded.live_writers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BatchWriter for RecordingWriter {
    async fn write_batch(&mut self, records: &[Record]) -> Result<(), SinkError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        let indexes = records.iter().map(index_of).collect();
        self.recorded.batches.lock().unwrap().push(indexes);
        Ok(())
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    type Writer = RecordingWriter;

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn open(&self) -> Result<RecordingWriter, SinkError> {
        let attempt = self.recorded.opens.fetch_add(1, Ordering::SeqCst);
        let fail = match self.open_failure {
            OpenFailure::Never => false,
            OpenFailure::First => attempt == 0,
            OpenFailure::Always => true,
        };
        if fail {
            return Err(SinkError::Other("connection refused".to_string()));
        }
        if self.hang_opens {
            std::future::pending::<()>().await;
        }

        self.recorded.live_writers.fetch_add(1, Ordering::SeqCst);
        Ok(RecordingWriter {
            recorded: Arc::clone(&self.recorded),
            hang: self.hang_writes,
        })
    }

    fn reconnect_every(&self) -> Option<usize> {
        self.reconnect_every
    }

    fn default_workers(&self) -> usize {
        self.default_workers
    }

    fn default_limit_alignment(&self) -> Option<usize> {
        self.limit_alignment
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }
}
