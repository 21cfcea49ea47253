//! Ranking Query Engine
//!
//! Read-side entry points over the aggregation store. Every call is bounded
//! by a deadline; the default comes from configuration and a caller can
//! tighten it per request with [`RankingEngine::with_deadline`].
//!
//! ## Operations
//!
//! | Operation           | Result                                    |
//! |---------------------|-------------------------------------------|
//! | `post_stats`        | view/like totals, zero for unknown posts  |
//! | `top_posts`         | up to 3 attributed posts by metric        |
//! | `top_authors`       | up to 3 authors by summed likes           |
//! | `*_limited`         | same, limit clamped to `1..=MAX_LIMIT`    |
//!
//! Reads never retry. A transient store failure surfaces as
//! `StoreUnavailable`.

use std::future::Future;
use std::time::Duration;

use poststats_core::{AggregatedStats, AuthorRank, PostRank, RankingMetric, TOP_N};
use poststats_store::SharedStore;

use crate::error::{QueryError, Result};

/// Upper bound for the debug ranking endpoints.
pub const MAX_LIMIT: usize = 100;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Clone)]
pub struct RankingEngine {
    store: SharedStore,
    timeout: Duration,
}

impl RankingEngine {
    pub fn new(store: SharedStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Engine whose deadline is the shorter of the configured timeout and
    /// `caller`.
    pub fn with_deadline(&self, caller: Option<Duration>) -> Self {
        let timeout = match caller {
            Some(deadline) => deadline.min(self.timeout),
            None => self.timeout,
        };
        Self {
            store: self.store.clone(),
            timeout,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn post_stats(&self, post_id: u64) -> Result<AggregatedStats> {
        self.bounded(self.store.post_stats(post_id)).await
    }

    /// Top posts for a metric given by name (`"likes"` or `"views"`).
    pub async fn top_posts_by_name(&self, metric: &str) -> Result<Vec<PostRank>> {
        let metric = parse_metric(metric)?;
        self.top_posts(metric).await
    }

    pub async fn top_posts(&self, metric: RankingMetric) -> Result<Vec<PostRank>> {
        self.top_posts_limited(metric, TOP_N).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn top_posts_limited(
        &self,
        metric: RankingMetric,
        limit: usize,
    ) -> Result<Vec<PostRank>> {
        let limit = clamp_limit(limit);
        self.bounded(self.store.top_posts(metric, limit)).await
    }

    pub async fn top_authors(&self) -> Result<Vec<AuthorRank>> {
        self.top_authors_limited(TOP_N).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn top_authors_limited(&self, limit: usize) -> Result<Vec<AuthorRank>> {
        let limit = clamp_limit(limit);
        self.bounded(self.store.top_authors(limit)).await
    }

    /// Store reachability, under the same deadline as queries.
    pub async fn ping(&self) -> Result<()> {
        self.bounded(self.store.ping()).await
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T>
    where
        F: Future<Output = poststats_store::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, query).await {
            Ok(result) => result.map_err(|e| {
                let err = QueryError::from(e);
                tracing::warn!(error = %err, "ranking query failed");
                err
            }),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ranking query deadline exceeded"
                );
                Err(QueryError::DeadlineExceeded(self.timeout))
            }
        }
    }
}

/// Case-insensitive metric name.
pub fn parse_metric(metric: &str) -> Result<RankingMetric> {
    metric
        .parse::<RankingMetric>()
        .map_err(|e| QueryError::InvalidArgument(e.to_string()))
}

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LIMIT)
}
