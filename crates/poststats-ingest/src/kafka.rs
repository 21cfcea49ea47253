//! Kafka partition reader.
//!
//! Reads one partition of the stats topic through `rdkafka`, assigned
//! directly (no consumer-group rebalancing) and positioned at the end of the
//! partition on startup.
//!
//! ## Configuration
//!
//! | Key                   | Description                         | Default           |
//! |-----------------------|-------------------------------------|-------------------|
//! | `bootstrap.servers`   | Kafka broker addresses              | `kafka:9092`      |
//! | `group.id`            | Group used for offset commits       | `poststats-ingest`|
//! | `poll.timeout.ms`     | Wait for the first record of a poll | `1000`            |
//! | `topic`               | Topic carrying stat events          | `StatsTopic`      |
//! | `partition`           | Partition to read                   | `0`               |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};

use crate::config::DEFAULT_TOPIC;
use crate::error::{IngestError, Result};
use crate::log::{LogRecord, PartitionReader};

/// Parsed configuration for the Kafka partition reader.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaReaderConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub topic: String,
    pub partition: u32,
    pub poll_timeout: Duration,
}

impl Default for KafkaReaderConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "kafka:9092".to_string(),
            group_id: "poststats-ingest".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            partition: 0,
            poll_timeout: Duration::from_millis(1000),
        }
    }
}

impl KafkaReaderConfig {
    /// Parse from a string key-value map; every key is optional.
    pub fn from_config_map(config: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        let bootstrap_servers = config
            .get("bootstrap.servers")
            .cloned()
            .unwrap_or(defaults.bootstrap_servers);
        if bootstrap_servers.trim().is_empty() {
            return Err(IngestError::Config(
                "'bootstrap.servers' must not be empty".to_string(),
            ));
        }

        let group_id = config
            .get("group.id")
            .cloned()
            .unwrap_or(defaults.group_id);

        let topic = config.get("topic").cloned().unwrap_or(defaults.topic);

        let partition = config
            .get("partition")
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|e| IngestError::Config(format!("invalid partition: {}", e)))
            })
            .transpose()?
            .unwrap_or(defaults.partition);

        let poll_timeout = config
            .get("poll.timeout.ms")
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|e| IngestError::Config(format!("invalid poll.timeout.ms: {}", e)))
            })
            .transpose()?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_timeout);

        Ok(Self {
            bootstrap_servers,
            group_id,
            topic,
            partition,
            poll_timeout,
        })
    }
}

/// [`PartitionReader`] over one Kafka topic partition.
pub struct KafkaPartitionReader {
    consumer: StreamConsumer,
    config: KafkaReaderConfig,
}

impl KafkaPartitionReader {
    /// Connect and assign the partition at its current end.
    pub fn new(config: KafkaReaderConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .create()?;

        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(&config.topic, config.partition as i32, Offset::End)?;
        consumer.assign(&assignment)?;

        tracing::info!(
            brokers = %config.bootstrap_servers,
            topic = %config.topic,
            partition = config.partition,
            "assigned Kafka partition at end offset"
        );

        Ok(Self { consumer, config })
    }
}

#[async_trait]
impl PartitionReader for KafkaPartitionReader {
    async fn poll(&mut self, max_records: usize) -> Result<Vec<LogRecord>> {
        let mut records = Vec::new();
        let mut wait = self.config.poll_timeout;

        while records.len() < max_records {
            let message = match tokio::time::timeout(wait, self.consumer.recv()).await {
                Ok(Ok(message)) => message,
                Ok(Err(e)) => return keep_collected(records, e.into()),
                Err(_) => break,
            };

            records.push(LogRecord {
                topic: message.topic().to_string(),
                partition: message.partition() as u32,
                offset: message.offset() as u64,
                timestamp: message.timestamp().to_millis(),
                value: message
                    .payload()
                    .map(Bytes::copy_from_slice)
                    .unwrap_or_default(),
            });

            // after the first record, only take what is already buffered
            wait = Duration::from_millis(1);
        }

        Ok(records)
    }

    async fn commit(&mut self, offset: u64) -> Result<()> {
        let mut position = TopicPartitionList::new();
        // Kafka stores the next offset to read
        position.add_partition_offset(
            &self.config.topic,
            self.config.partition as i32,
            Offset::Offset(offset as i64 + 1),
        )?;
        self.consumer.commit(&position, CommitMode::Async)?;
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.config.topic
    }

    fn partition(&self) -> u32 {
        self.config.partition
    }
}

/// End a poll that hit a receive error.
///
/// The stream consumer has already moved past any records collected so far
/// and they are not fetched again until a restart, so they are returned and
/// the error surfaces on the next poll instead.
fn keep_collected(records: Vec<LogRecord>, error: IngestError) -> Result<Vec<LogRecord>> {
    if records.is_empty() {
        return Err(error);
    }
    tracing::warn!(
        collected = records.len(),
        error = %error,
        "Kafka receive failed mid-poll, returning collected records"
    );
    Ok(records)
}
