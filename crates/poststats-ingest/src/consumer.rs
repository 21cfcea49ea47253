//! Ingestion Consumer
//!
//! Drains one partition of the stats log into the aggregation store.
//!
//! ## Per-batch algorithm
//!
//! ```text
//! poll(max_poll_records)
//!   │
//!   ├─ empty ──────────────▶ sleep poll_interval
//!   │
//!   ▼
//! decode each record ──bad──▶ warn + skipped += 1
//!   │
//!   ▼
//! StatFact { .., ingested_at: now }   (one timestamp per batch)
//!   │
//!   ▼
//! append_stat_facts ── any error ──▶ backoff, retry (until shutdown)
//!   │
//!   ▼
//! commit(last offset)
//! ```
//!
//! The position is committed only after the batch is stored, so a crash in
//! between redelivers the batch: counts may inflate, nothing is lost. A batch
//! of decoded facts is never skipped; the store either takes it or the
//! consumer keeps retrying.
//!
//! ## Shutdown
//!
//! The loop checks the watch channel between batches and while sleeping. A
//! batch stuck in store backoff is abandoned uncommitted on shutdown.

use std::sync::Arc;

use poststats_core::codec;
use poststats_core::{now_ms, StatFact};
use poststats_store::SharedStore;
use tokio::sync::watch;

use crate::config::IngestConfig;
use crate::error::Result;
use crate::log::{LogRecord, PartitionReader};
use crate::metrics::IngestMetrics;
use crate::retry::{retry_with_backoff, sleep_or_shutdown, Cancelled};

/// What happened to one polled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Facts (if any) are in the store; position committed.
    Stored { facts: usize, skipped: usize },
    /// Shutdown arrived during store backoff; position not committed.
    Abandoned,
}

pub struct IngestionConsumer {
    reader: Box<dyn PartitionReader>,
    store: SharedStore,
    config: IngestConfig,
    metrics: Arc<IngestMetrics>,
}

impl IngestionConsumer {
    pub fn new(
        reader: Box<dyn PartitionReader>,
        store: SharedStore,
        config: IngestConfig,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            reader,
            store,
            config,
            metrics,
        }
    }

    /// Run until `shutdown` carries `true` (or its sender is dropped).
    #[tracing::instrument(
        name = "ingestion_consumer",
        skip_all,
        fields(topic = %self.reader.topic(), partition = self.reader.partition())
    )]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            max_poll_records = self.config.max_poll_records,
            "ingestion consumer started"
        );

        let mut consecutive_poll_errors = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let records = match self.reader.poll(self.config.max_poll_records).await {
                Ok(records) => {
                    consecutive_poll_errors = 0;
                    records
                }
                Err(e) => {
                    self.metrics.poll_errors.inc();
                    let backoff = self.config.retry.delay(consecutive_poll_errors);
                    consecutive_poll_errors = consecutive_poll_errors.saturating_add(1);
                    tracing::error!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "error polling stats log"
                    );
                    if sleep_or_shutdown(backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if records.is_empty() {
                if sleep_or_shutdown(self.config.poll_interval, &mut shutdown).await {
                    break;
                }
                continue;
            }

            if self.process_batch(&records, &mut shutdown).await == BatchOutcome::Abandoned {
                break;
            }
        }

        tracing::info!("ingestion consumer stopped");
        Ok(())
    }

    /// Decode, store and commit one polled batch.
    pub async fn process_batch(
        &mut self,
        records: &[LogRecord],
        shutdown: &mut watch::Receiver<bool>,
    ) -> BatchOutcome {
        let Some(last_offset) = records.last().map(|r| r.offset) else {
            return BatchOutcome::Stored {
                facts: 0,
                skipped: 0,
            };
        };
        self.metrics.consumed.inc_by(records.len() as u64);

        let ingested_at = now_ms();
        let mut facts = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in records {
            match codec::decode(&record.value) {
                Ok(event) => facts.push(StatFact::from_event(&event, ingested_at)),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        offset = record.offset,
                        appended_at = record.timestamp,
                        bytes = record.value.len(),
                        error = %e,
                        "skipping undecodable stat event"
                    );
                }
            }
        }
        self.metrics.skipped.inc_by(skipped as u64);

        let outcome = if facts.is_empty() {
            BatchOutcome::Stored { facts: 0, skipped }
        } else {
            let store = &self.store;
            let metrics = &self.metrics;
            let batch = facts.as_slice();

            let result = retry_with_backoff(&self.config.retry, shutdown, |attempt| {
                if attempt > 0 {
                    metrics.store_retries.inc();
                }
                store.append_stat_facts(batch)
            })
            .await;

            match result {
                Ok(()) => {
                    self.metrics.ingested.inc_by(facts.len() as u64);
                    tracing::debug!(
                        facts = facts.len(),
                        skipped,
                        last_offset,
                        "batch ingested"
                    );
                    BatchOutcome::Stored {
                        facts: facts.len(),
                        skipped,
                    }
                }
                Err(Cancelled) => {
                    tracing::warn!(
                        facts = facts.len(),
                        last_offset,
                        "shutdown during store backoff, batch left uncommitted"
                    );
                    return BatchOutcome::Abandoned;
                }
            }
        };

        if let Err(e) = self.reader.commit(last_offset).await {
            tracing::warn!(offset = last_offset, error = %e, "failed to commit log position");
        }

        outcome
    }
}
