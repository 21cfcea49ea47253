//! PostStats Aggregation Store
//!
//! Append-only storage for stat facts and post attributions, with all
//! aggregation done at read time.
//!
//! ## Architecture
//!
//! ```text
//! Ingestion Consumer ──append_stat_facts──┐
//!                                         ▼
//!                              ┌─────────────────────┐
//! Attribution Writer ─insert─▶ │  AggregationStore   │ ◀── Ranking Query Engine
//!                              │  stat_facts         │     (post_stats, top_posts,
//!                              │  author_facts       │      top_authors)
//!                              └─────────────────────┘
//! ```
//!
//! Stat facts and author facts arrive independently. The store never rejects
//! a stat fact because its post has no author yet; the join happens when a
//! ranking is read.
//!
//! ## Backends
//!
//! - [`MemoryAggregationStore`]: columnar in-process tables, for tests and
//!   single-process deployments
//! - [`SqliteAggregationStore`]: embedded, persistent (default)
//! - `PostgresAggregationStore`: shared server (`postgres` feature)
//!
//! Every backend orders rankings exactly as [`poststats_core::ranking`] does.
//!
//! ## Consistency
//!
//! - A batch passed to `append_stat_facts` becomes visible atomically
//! - Rows are never updated or deleted
//! - Each post has at most one author fact

use std::sync::Arc;

use async_trait::async_trait;
use poststats_core::{AggregatedStats, AuthorFact, AuthorRank, PostRank, RankingMetric, StatFact};

pub mod error;
pub mod memory;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryAggregationStore;
pub use sqlite::SqliteAggregationStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresAggregationStore;

/// Shared handle injected into the consumer, writer and query engine.
pub type SharedStore = Arc<dyn AggregationStore>;

/// Storage backend for stat facts and post attributions.
#[async_trait]
pub trait AggregationStore: Send + Sync {
    // ============================================================
    // WRITE PATH
    // ============================================================

    /// Append a batch of stat facts.
    ///
    /// The batch is applied atomically and in order. Facts for posts without
    /// an attribution are accepted.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / transient `Database`: nothing was written, retry
    /// - `Internal` / permanent `Database`: the batch can never be stored
    async fn append_stat_facts(&self, facts: &[StatFact]) -> Result<()>;

    /// Record which author created a post.
    ///
    /// Writing the same pair again is a no-op. Writing a different author for
    /// an attributed post fails with `AttributionConflict` and leaves the
    /// existing fact untouched.
    async fn insert_author_fact(&self, fact: &AuthorFact) -> Result<()>;

    // ============================================================
    // READ PATH
    // ============================================================

    /// View and like totals for one post; zero totals when it has no facts.
    async fn post_stats(&self, post_id: u64) -> Result<AggregatedStats>;

    /// Attributed posts ordered by `metric`, at most `limit` entries.
    async fn top_posts(&self, metric: RankingMetric, limit: usize) -> Result<Vec<PostRank>>;

    /// Authors ordered by summed likes across their posts, at most `limit`.
    async fn top_authors(&self, limit: usize) -> Result<Vec<AuthorRank>>;

    /// Cheap round trip to check the backend is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Signed storage representation of a post id (bit-identical).
pub(crate) fn post_id_to_db(post_id: u64) -> i64 {
    post_id as i64
}

pub(crate) fn post_id_from_db(value: i64) -> u64 {
    value as u64
}

pub(crate) fn count_from_db(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::Internal(format!("negative aggregate: {value}")))
}

/// Limit as a SQL bind value.
pub(crate) fn limit_to_db(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Ranking ORDER BY clause. Post ids are stored as signed integers, so the
/// `post_id < 0` term restores unsigned order for ids above `i64::MAX`.
pub(crate) fn post_order_clause(metric: RankingMetric) -> &'static str {
    match metric {
        RankingMetric::Likes => "likes DESC, views DESC, (s.post_id < 0) ASC, s.post_id ASC",
        RankingMetric::Views => "views DESC, likes DESC, (s.post_id < 0) ASC, s.post_id ASC",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_id_round_trips_through_signed() {
        for id in [0u64, 1, i64::MAX as u64, i64::MAX as u64 + 1, u64::MAX] {
            assert_eq!(post_id_from_db(post_id_to_db(id)), id);
        }
    }

    #[test]
    fn test_count_from_db_rejects_negative() {
        assert_eq!(count_from_db(7).unwrap(), 7);
        assert!(matches!(count_from_db(-1), Err(StoreError::Internal(_))));
    }

    #[test]
    fn test_order_clause_leads_with_metric() {
        assert!(post_order_clause(RankingMetric::Likes).starts_with("likes DESC"));
        assert!(post_order_clause(RankingMetric::Views).starts_with("views DESC"));
    }
}
