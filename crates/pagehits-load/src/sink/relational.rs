//! MySQL sink
//!
//! Each worker holds one `MySqlConnection` and writes every batch as a single
//! multi-row `INSERT`, one network round trip per batch. Workers cycle their
//! connection every `reconnect_every` records to bound per-connection
//! server-side resource growth.

use async_trait::async_trait;
use pagehits_common::types::Record;
use sqlx::{Connection, MySql, MySqlConnection, QueryBuilder};
use tracing::debug;

use super::{BatchWriter, Connector};
use crate::config::{
    DEFAULT_MYSQL_TABLE, DEFAULT_RELATIONAL_WORKERS, MYSQL_MAX_BATCH_SIZE, RELATIONAL_RECONNECT_EVERY,
};
use crate::error::SinkError;

/// Opens one MySQL connection per worker.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    dsn: String,
    table: String,
    reconnect_every: usize,
}

impl MySqlConnector {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            table: DEFAULT_MYSQL_TABLE.to_string(),
            reconnect_every: RELATIONAL_RECONNECT_EVERY,
        }
    }

    /// Target table; must already be a validated identifier.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_reconnect_every(mut self, records: usize) -> Self {
        self.reconnect_every = records.max(1);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Writer = MySqlBatchWriter;

    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn open(&self) -> Result<MySqlBatchWriter, SinkError> {
        let conn = MySqlConnection::connect(&self.dsn).await?;
        debug!(table = %self.table, "Opened MySQL connection");
        Ok(MySqlBatchWriter {
            conn,
            table: self.table.clone(),
        })
    }

    async fn close(&self, writer: MySqlBatchWriter) -> Result<(), SinkError> {
        writer.conn.close().await?;
        Ok(())
    }

    fn reconnect_every(&self) -> Option<usize> {
        Some(self.reconnect_every)
    }

    fn default_workers(&self) -> usize {
        DEFAULT_RELATIONAL_WORKERS
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(MYSQL_MAX_BATCH_SIZE)
    }
}

/// One worker's MySQL connection.
pub struct MySqlBatchWriter {
    conn: MySqlConnection,
    table: String,
}

#[async_trait]
impl BatchWriter for MySqlBatchWriter {
    async fn write_batch(&mut self, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut query = insert_statement(&self.table, records);
        query.build().execute(&mut self.conn).await?;

        Ok(())
    }
}

/// Build one `INSERT ... VALUES (..), (..)` with a row per record.
pub fn insert_statement<'a>(table: &str, records: &'a [Record]) -> QueryBuilder<'a, MySql> {
    let mut query_builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
        "INSERT INTO {} (project, page, hits, size) ",
        table
    ));

    query_builder.push_values(records, |mut b, record| {
        b.push_bind(&record.project)
            .push_bind(&record.page)
            .push_bind(record.hits)
            .push_bind(record.size);
    });

    query_builder
}
