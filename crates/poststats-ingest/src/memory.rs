//! In-process durable log.
//!
//! A single named topic split into partitions. Records are never removed, so
//! any reader can replay from an older offset, and committed positions
//! survive reader restarts for as long as the `MemoryLog` lives.
//!
//! ```ignore
//! let log = MemoryLog::new("StatsTopic", 1);
//! let mut reader = log.reader(0, StartOffset::Latest).await?;
//! log.append_event(0, &StatEvent::like(42)).await?;
//! let batch = reader.poll(100).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use poststats_core::codec::{encode, StatEvent};
use tokio::sync::RwLock;

use crate::error::{IngestError, Result};
use crate::log::{LogRecord, PartitionReader};

/// Where a new reader starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// First record ever appended.
    Earliest,
    /// Only records appended after the reader is created.
    Latest,
    /// Just after the last committed offset, or the beginning if none.
    Committed,
    /// A specific offset.
    At(u64),
}

#[derive(Debug, Default)]
struct PartitionLog {
    values: Vec<(i64, Bytes)>,
    committed: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    topic: String,
    partitions: Vec<RwLock<PartitionLog>>,
}

/// Append-only, partitioned, replayable log held in memory.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

impl MemoryLog {
    pub fn new(topic: impl Into<String>, partitions: u32) -> Self {
        let partitions = (0..partitions.max(1))
            .map(|_| RwLock::new(PartitionLog::default()))
            .collect();
        Self {
            inner: Arc::new(Inner {
                topic: topic.into(),
                partitions,
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn partition_count(&self) -> u32 {
        self.inner.partitions.len() as u32
    }

    fn partition_log(&self, partition: u32) -> Result<&RwLock<PartitionLog>> {
        self.inner
            .partitions
            .get(partition as usize)
            .ok_or_else(|| {
                IngestError::Source(format!(
                    "topic '{}' has no partition {}",
                    self.inner.topic, partition
                ))
            })
    }

    /// Append a raw payload and return its offset.
    pub async fn append(&self, partition: u32, value: Bytes) -> Result<u64> {
        let mut log = self.partition_log(partition)?.write().await;
        let offset = log.values.len() as u64;
        log.values.push((poststats_core::now_ms(), value));
        Ok(offset)
    }

    /// Encode and append a stat event.
    pub async fn append_event(&self, partition: u32, event: &StatEvent) -> Result<u64> {
        self.append(partition, encode(event)).await
    }

    /// Offset the next appended record will get.
    pub async fn end_offset(&self, partition: u32) -> Result<u64> {
        Ok(self.partition_log(partition)?.read().await.values.len() as u64)
    }

    /// Last committed offset of a partition.
    pub async fn committed(&self, partition: u32) -> Result<Option<u64>> {
        Ok(self.partition_log(partition)?.read().await.committed)
    }

    /// Open a reader on one partition.
    pub async fn reader(&self, partition: u32, start: StartOffset) -> Result<MemoryPartitionReader> {
        let log = self.partition_log(partition)?.read().await;
        let position = match start {
            StartOffset::Earliest => 0,
            StartOffset::Latest => log.values.len() as u64,
            StartOffset::Committed => log.committed.map(|c| c + 1).unwrap_or(0),
            StartOffset::At(offset) => offset,
        };
        drop(log);

        Ok(MemoryPartitionReader {
            log: self.clone(),
            partition,
            position,
        })
    }
}

/// Reader over one partition of a [`MemoryLog`].
#[derive(Debug)]
pub struct MemoryPartitionReader {
    log: MemoryLog,
    partition: u32,
    position: u64,
}

impl MemoryPartitionReader {
    /// Offset of the next record this reader will return.
    pub fn position(&self) -> u64 {
        self.position
    }
}

#[async_trait]
impl PartitionReader for MemoryPartitionReader {
    async fn poll(&mut self, max_records: usize) -> Result<Vec<LogRecord>> {
        let log = self.log.partition_log(self.partition)?.read().await;
        let start = self.position as usize;
        if start >= log.values.len() {
            return Ok(Vec::new());
        }
        let end = log.values.len().min(start.saturating_add(max_records));

        let records: Vec<LogRecord> = log.values[start..end]
            .iter()
            .enumerate()
            .map(|(i, (timestamp, value))| LogRecord {
                topic: self.log.inner.topic.clone(),
                partition: self.partition,
                offset: (start + i) as u64,
                timestamp: Some(*timestamp),
                value: value.clone(),
            })
            .collect();

        self.position = end as u64;
        Ok(records)
    }

    async fn commit(&mut self, offset: u64) -> Result<()> {
        let mut log = self.log.partition_log(self.partition)?.write().await;
        if offset >= log.values.len() as u64 {
            return Err(IngestError::Source(format!(
                "cannot commit offset {} beyond end of partition {} ({})",
                offset,
                self.partition,
                log.values.len()
            )));
        }
        log.committed = Some(log.committed.map_or(offset, |c| c.max(offset)));
        Ok(())
    }

    fn topic(&self) -> &str {
        self.log.topic()
    }

    fn partition(&self) -> u32 {
        self.partition
    }
}
