//! PostStats ingestion.
//!
//! Moves stat events from the durable log into the aggregation store.
//!
//! ```text
//!   gateway ──▶ [ durable log: StatsTopic / partition 0 ]
//!                          │  PartitionReader::poll
//!                          ▼
//!                 IngestionConsumer ── decode ── skip bad messages
//!                          │  append_stat_facts (retry with backoff)
//!                          ▼
//!                  AggregationStore
//! ```
//!
//! Log sources:
//! - [`MemoryLog`]: in-process, for tests and single-process deployments
//! - `KafkaPartitionReader`: `rdkafka` reader (`kafka` feature)

pub mod config;
pub mod consumer;
pub mod error;
pub mod log;
pub mod memory;
pub mod metrics;
pub mod retry;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::IngestConfig;
pub use consumer::{BatchOutcome, IngestionConsumer};
pub use error::{IngestError, Result};
pub use log::{LogRecord, PartitionReader};
pub use memory::{MemoryLog, MemoryPartitionReader, StartOffset};
pub use metrics::IngestMetrics;
pub use retry::{Cancelled, RetryPolicy};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaPartitionReader, KafkaReaderConfig};
