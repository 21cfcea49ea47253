//! Integration tests for the ingestion consumer.
//!
//! Each test runs a real `IngestionConsumer` task over a `MemoryLog` and
//! observes the aggregation store it writes to.
//!
//! ## Test Scenarios
//!
//! 1. **corrupt_message_between_valid_events**: bad bytes are skipped
//! 2. **transient_store_failures_delay_but_do_not_lose**: flaky store
//! 3. **non_transient_store_errors_are_retried**: rejected writes are retried,
//!    never dropped
//! 4. **full_sqlite_store_holds_batch_until_space_frees**: `SQLITE_FULL` is
//!    waited out, then the whole batch lands
//! 5. **starts_at_newest_offset**: history published before startup is ignored
//! 6. **shutdown_during_backoff_leaves_batch_for_redelivery**: at-least-once
//! 7. **redelivered_events_inflate_counts**: replay is not deduplicated

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use poststats_core::{
    AggregatedStats, AuthorFact, AuthorRank, PostRank, RankingMetric, StatEvent, StatFact,
};
use poststats_ingest::{
    IngestConfig, IngestMetrics, IngestionConsumer, MemoryLog, RetryPolicy, StartOffset,
};
use poststats_store::{
    AggregationStore, MemoryAggregationStore, SqliteAggregationStore, StoreError,
};
use prometheus::Registry;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Store wrapper that fails the first `failures` appends, either as
/// unavailable or with a non-transient error.
struct FlakyStore {
    inner: MemoryAggregationStore,
    failures: AtomicUsize,
    append_calls: AtomicUsize,
    transient: bool,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryAggregationStore::new(),
            failures: AtomicUsize::new(failures),
            append_calls: AtomicUsize::new(0),
            transient: true,
        }
    }

    fn rejecting(failures: usize) -> Self {
        Self {
            transient: false,
            ..Self::new(failures)
        }
    }
}

#[async_trait]
impl AggregationStore for FlakyStore {
    async fn append_stat_facts(&self, facts: &[StatFact]) -> poststats_store::Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(if self.transient {
                StoreError::Unavailable("connection refused".to_string())
            } else {
                StoreError::Internal("disk I/O error".to_string())
            });
        }
        self.inner.append_stat_facts(facts).await
    }

    async fn insert_author_fact(&self, fact: &AuthorFact) -> poststats_store::Result<()> {
        self.inner.insert_author_fact(fact).await
    }

    async fn post_stats(&self, post_id: u64) -> poststats_store::Result<AggregatedStats> {
        self.inner.post_stats(post_id).await
    }

    async fn top_posts(
        &self,
        metric: RankingMetric,
        limit: usize,
    ) -> poststats_store::Result<Vec<PostRank>> {
        self.inner.top_posts(metric, limit).await
    }

    async fn top_authors(&self, limit: usize) -> poststats_store::Result<Vec<AuthorRank>> {
        self.inner.top_authors(limit).await
    }

    async fn ping(&self) -> poststats_store::Result<()> {
        Ok(())
    }
}

fn fast_config() -> IngestConfig {
    IngestConfig {
        poll_interval: Duration::from_millis(5),
        retry: RetryPolicy::new(Duration::from_millis(2), Duration::from_millis(10), 2.0),
        ..IngestConfig::default()
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<poststats_ingest::Result<()>>,
    metrics: Arc<IngestMetrics>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("consumer did not stop")
            .unwrap()
            .unwrap();
    }
}

async fn start(
    log: &MemoryLog,
    start: StartOffset,
    store: Arc<dyn AggregationStore>,
    config: IngestConfig,
) -> Running {
    let metrics = Arc::new(IngestMetrics::new(&Registry::new()).unwrap());
    let reader = log.reader(0, start).await.unwrap();
    let consumer = IngestionConsumer::new(Box::new(reader), store, config, metrics.clone());
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(consumer.run(rx));
    Running {
        shutdown,
        handle,
        metrics,
    }
}

async fn wait_for_stats(store: &dyn AggregationStore, post_id: u64, expected: (u64, u64)) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = store.post_stats(post_id).await.unwrap();
        if (stats.views, stats.likes) == expected {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "post {post_id}: expected {expected:?}, got ({}, {})",
                stats.views, stats.likes
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------

#[tokio::test]
async fn corrupt_message_between_valid_events() {
    let log = MemoryLog::new("StatsTopic", 1);
    let store = Arc::new(MemoryAggregationStore::new());
    let running = start(&log, StartOffset::Latest, store.clone(), fast_config()).await;

    log.append_event(0, &StatEvent::view(1)).await.unwrap();
    log.append(0, Bytes::from_static(&[0x08, 0x80])).await.unwrap();
    log.append_event(0, &StatEvent::like(1)).await.unwrap();

    wait_for_stats(&*store, 1, (1, 1)).await;
    assert_eq!(running.metrics.skipped.get(), 1);
    assert_eq!(running.metrics.ingested.get(), 2);
    assert_eq!(running.metrics.consumed.get(), 3);

    running.stop().await;
    assert_eq!(log.committed(0).await.unwrap(), Some(2));
}

#[tokio::test]
async fn transient_store_failures_delay_but_do_not_lose() {
    let log = MemoryLog::new("StatsTopic", 1);
    let store = Arc::new(FlakyStore::new(4));
    let running = start(&log, StartOffset::Latest, store.clone(), fast_config()).await;

    for _ in 0..3 {
        log.append_event(0, &StatEvent::like(7)).await.unwrap();
    }

    wait_for_stats(&*store, 7, (0, 3)).await;
    assert_eq!(running.metrics.store_retries.get(), 4);
    running.stop().await;
}

#[tokio::test]
async fn non_transient_store_errors_are_retried() {
    let log = MemoryLog::new("StatsTopic", 1);
    let store = Arc::new(FlakyStore::rejecting(3));
    let running = start(&log, StartOffset::Latest, store.clone(), fast_config()).await;

    log.append_event(0, &StatEvent::view(666)).await.unwrap();
    wait_for_stats(&*store, 666, (1, 0)).await;
    assert_eq!(store.append_calls.load(Ordering::SeqCst), 4);
    assert_eq!(running.metrics.store_retries.get(), 3);
    assert_eq!(running.metrics.ingested.get(), 1);

    running.stop().await;
    assert_eq!(log.committed(0).await.unwrap(), Some(0));
}

#[tokio::test]
async fn full_sqlite_store_holds_batch_until_space_frees() {
    let store = Arc::new(SqliteAggregationStore::new_in_memory().await.unwrap());
    let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
        .fetch_one(store.pool())
        .await
        .unwrap();
    sqlx::query(&format!("PRAGMA max_page_count = {page_count}"))
        .execute(store.pool())
        .await
        .unwrap();

    let log = MemoryLog::new("StatsTopic", 1);
    for _ in 0..500 {
        log.append_event(0, &StatEvent::like(9)).await.unwrap();
    }
    let running = start(&log, StartOffset::Earliest, store.clone(), fast_config()).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while running.metrics.store_retries.get() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "full store was not retried");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.post_stats(9).await.unwrap().likes, 0);
    assert_eq!(log.committed(0).await.unwrap(), None);

    sqlx::query("PRAGMA max_page_count = 1000000")
        .execute(store.pool())
        .await
        .unwrap();
    wait_for_stats(&*store, 9, (0, 500)).await;

    running.stop().await;
    assert_eq!(log.committed(0).await.unwrap(), Some(499));
}

#[tokio::test]
async fn starts_at_newest_offset() {
    let log = MemoryLog::new("StatsTopic", 1);
    log.append_event(0, &StatEvent::view(3)).await.unwrap();
    log.append_event(0, &StatEvent::view(3)).await.unwrap();

    let store = Arc::new(MemoryAggregationStore::new());
    let running = start(&log, StartOffset::Latest, store.clone(), fast_config()).await;

    log.append_event(0, &StatEvent::like(3)).await.unwrap();
    wait_for_stats(&*store, 3, (0, 1)).await;

    running.stop().await;
}

#[tokio::test]
async fn shutdown_during_backoff_leaves_batch_for_redelivery() {
    let log = MemoryLog::new("StatsTopic", 1);
    let down = Arc::new(FlakyStore::new(usize::MAX));
    let mut config = fast_config();
    config.retry = RetryPolicy::new(Duration::from_secs(60), Duration::from_secs(60), 2.0);
    let running = start(&log, StartOffset::Earliest, down.clone(), config).await;

    log.append_event(0, &StatEvent::like(5)).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while down.append_calls.load(Ordering::SeqCst) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "no write attempted");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    running.stop().await;
    assert_eq!(log.committed(0).await.unwrap(), None);

    // restart against a healthy store from the committed position
    let healthy = Arc::new(MemoryAggregationStore::new());
    let restarted = start(&log, StartOffset::Committed, healthy.clone(), fast_config()).await;
    wait_for_stats(&*healthy, 5, (0, 1)).await;
    restarted.stop().await;
}

#[tokio::test]
async fn redelivered_events_inflate_counts() {
    let log = MemoryLog::new("StatsTopic", 1);
    log.append_event(0, &StatEvent::view(4)).await.unwrap();
    log.append_event(0, &StatEvent::view(4)).await.unwrap();

    let store = Arc::new(MemoryAggregationStore::new());
    let first = start(&log, StartOffset::Earliest, store.clone(), fast_config()).await;
    wait_for_stats(&*store, 4, (2, 0)).await;
    first.stop().await;

    // replay from the beginning, as after losing the committed position
    let second = start(&log, StartOffset::Earliest, store.clone(), fast_config()).await;
    wait_for_stats(&*store, 4, (4, 0)).await;
    second.stop().await;
}
