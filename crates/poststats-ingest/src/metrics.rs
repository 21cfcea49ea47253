//! Ingestion counters.
//!
//! Registered into a caller-owned [`Registry`] so tests and multiple
//! consumers in one process never collide on a global.

use prometheus::{IntCounter, Registry};

#[derive(Debug, Clone)]
pub struct IngestMetrics {
    /// Records read from the log.
    pub consumed: IntCounter,
    /// Stat facts written to the aggregation store.
    pub ingested: IntCounter,
    /// Records skipped because they failed to decode.
    pub skipped: IntCounter,
    /// Store write attempts after the first. Failed writes are never dropped.
    pub store_retries: IntCounter,
    /// Failed reader polls.
    pub poll_errors: IntCounter,
}

impl IngestMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            consumed: IntCounter::new(
                "poststats_ingest_records_consumed_total",
                "Total records read from the stats log",
            )?,
            ingested: IntCounter::new(
                "poststats_ingest_facts_ingested_total",
                "Total stat facts written to the aggregation store",
            )?,
            skipped: IntCounter::new(
                "poststats_ingest_records_skipped_total",
                "Total records skipped because they could not be decoded",
            )?,
            store_retries: IntCounter::new(
                "poststats_ingest_store_retries_total",
                "Total retried aggregation store writes",
            )?,
            poll_errors: IntCounter::new(
                "poststats_ingest_poll_errors_total",
                "Total failed polls of the stats log",
            )?,
        };

        registry.register(Box::new(metrics.consumed.clone()))?;
        registry.register(Box::new(metrics.ingested.clone()))?;
        registry.register(Box::new(metrics.skipped.clone()))?;
        registry.register(Box::new(metrics.store_retries.clone()))?;
        registry.register(Box::new(metrics.poll_errors.clone()))?;

        Ok(metrics)
    }
}
