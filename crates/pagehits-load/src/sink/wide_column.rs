//! DynamoDB sink
//!
//! A batch becomes one `BatchWriteItem` request holding one put per record.
//! The SDK client is cheap to clone, so every worker gets its own handle and
//! no connection cycling is needed.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    config::Region,
    error::DisplayErrorContext,
    types::{AttributeValue, PutRequest, WriteRequest},
    Client,
};
use pagehits_common::types::Record;
use tracing::info;
use uuid::Uuid;

use super::{BatchWriter, Connector};
use crate::config::{
    WideColumnConfig, DEFAULT_WIDE_COLUMN_WORKERS, DYNAMODB_MAX_BATCH_SIZE,
    WIDE_COLUMN_LIMIT_ALIGNMENT,
};
use crate::error::SinkError;

/// Hands out DynamoDB client handles bound to one table.
#[derive(Debug, Clone)]
pub struct DynamoDbConnector {
    client: Client,
    table: String,
}

impl DynamoDbConnector {
    /// Build a client from the default AWS credential chain.
    pub async fn connect(config: &WideColumnConfig) -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&shared_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            region = %config.region,
            endpoint = ?config.endpoint,
            table = %config.table,
            "DynamoDB client initialized"
        );

        Self::from_client(Client::from_conf(builder.build()), config.table.clone())
    }

    pub fn from_client(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl Connector for DynamoDbConnector {
    type Writer = DynamoDbBatchWriter;

    fn name(&self) -> &'static str {
        "dynamodb"
    }

    async fn open(&self) -> Result<DynamoDbBatchWriter, SinkError> {
        Ok(DynamoDbBatchWriter {
            client: self.client.clone(),
            table: self.table.clone(),
        })
    }

    fn default_workers(&self) -> usize {
        DEFAULT_WIDE_COLUMN_WORKERS
    }

    fn default_limit_alignment(&self) -> Option<usize> {
        Some(WIDE_COLUMN_LIMIT_ALIGNMENT)
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(DYNAMODB_MAX_BATCH_SIZE)
    }
}

/// One worker's handle on the DynamoDB client.
pub struct DynamoDbBatchWriter {
    client: Client,
    table: String,
}

#[async_trait]
impl BatchWriter for DynamoDbBatchWriter {
    async fn write_batch(&mut self, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let requests = put_requests(records)?;
        let requested = requests.len();

        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table, requests)
            .send()
            .await
            .map_err(|e| SinkError::DynamoDb(DisplayErrorContext(&e).to_string()))?;

        let unprocessed = output
            .unprocessed_items()
            .and_then(|items| items.get(&self.table))
            .map_or(0, Vec::len);

        if unprocessed > 0 {
            return Err(SinkError::Unprocessed {
                count: unprocessed,
                requested,
            });
        }

        Ok(())
    }
}

/// One put request per record, in record order.
pub fn put_requests(records: &[Record]) -> Result<Vec<WriteRequest>, SinkError> {
    records
        .iter()
        .map(|record| {
            let put = PutRequest::builder()
                .set_item(Some(item(record)))
                .build()
                .map_err(|e| SinkError::InvalidRequest(e.to_string()))?;
            Ok(WriteRequest::builder().put_request(put).build())
        })
        .collect()
}

/// DynamoDB item for a record, keyed by a fresh random `id`.
pub fn item(record: &Record) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("id".to_string(), AttributeValue::S(Uuid::new_v4().to_string())),
        ("project".to_string(), AttributeValue::S(record.project.clone())),
        ("page".to_string(), AttributeValue::S(record.page.clone())),
        ("hits".to_string(), AttributeValue::N(record.hits.to_string())),
        ("size".to_string(), AttributeValue::N(record.size.to_string())),
    ])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new("de", format!("Seite_{}", i), i as i64, 2048))
            .collect()
    }

    #[test]
    fn test_item_attributes() {
        let record = Record::new("en", "Main_Page", 42, 9000);
        let item = item(&record);

        assert_eq!(item.len(), 5);
        assert_eq!(item["project"], AttributeValue::S("en".to_string()));
        assert_eq!(item["page"], AttributeValue::S("Main_Page".to_string()));
        assert_eq!(item["hits"], AttributeValue::N("42".to_string()));
        assert_eq!(item["size"], AttributeValue::N("9000".to_string()));

        let id = item["id"].as_s().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_item_ids_are_unique() {
        let record = Record::new("en", "Main_Page", 1, 1);
        assert_ne!(item(&record)["id"], item(&record)["id"]);
    }

    #[test]
    fn test_put_requests_follow_batch_length() {
        for n in [1, 5, 10] {
            let records = records(n);
            let requests = put_requests(&records).unwrap();
            assert_eq!(requests.len(), n);

            let last = requests.last().unwrap().put_request().unwrap();
            assert_eq!(
                last.item()["page"],
                AttributeValue::S(format!("Seite_{}", n - 1))
            );
        }
    }

    #[test]
    fn test_connector_lifecycle_rules() {
        let client = Client::from_conf(
            aws_sdk_dynamodb::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .build(),
        );
        let connector = DynamoDbConnector::from_client(client, "hits");

        assert_eq!(connector.reconnect_every(), None);
        assert_eq!(connector.default_workers(), 1);
        assert_eq!(connector.default_limit_alignment(), Some(8));
        assert_eq!(connector.max_batch_size(), Some(25));
        assert_eq!(connector.table(), "hits");
    }
}
