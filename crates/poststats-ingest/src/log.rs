//! Durable log contract.
//!
//! The ingestion consumer only sees a [`PartitionReader`]: one partition of one
//! topic, read in offset order, delivered at least once.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A message read from the durable log.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: u32,
    /// Offset within the partition.
    pub offset: u64,
    /// Append time in milliseconds since epoch, when the log records one.
    pub timestamp: Option<i64>,
    /// Encoded stat event.
    pub value: Bytes,
}

/// Reader over a single log partition.
#[async_trait]
pub trait PartitionReader: Send {
    /// Return up to `max_records` records after the current position.
    ///
    /// Returns an empty vec when nothing new is available. Records come back
    /// in offset order and the reader advances past them; they will only be
    /// delivered again after a restart from an older committed position.
    async fn poll(&mut self, max_records: usize) -> Result<Vec<LogRecord>>;

    /// Mark every record up to and including `offset` as processed.
    async fn commit(&mut self, offset: u64) -> Result<()>;

    fn topic(&self) -> &str;

    fn partition(&self) -> u32;
}
