//! SQLite Aggregation Store
//!
//! Persistent embedded backend and the default for a single stats node.
//!
//! ## Usage
//!
//! ```ignore
//! use poststats_store::{AggregationStore, SqliteAggregationStore};
//!
//! let store = SqliteAggregationStore::new("data/poststats.db").await?;
//! let stats = store.post_stats(42).await?;
//! ```
//!
//! ## Implementation Details
//!
//! - WAL journal so ranking reads don't block ingestion writes
//! - Each `append_stat_facts` batch is one transaction
//! - Schema is created on startup by `sqlx::migrate!("./migrations")`
//! - Post ids are stored as the bit-identical signed integer

use std::path::Path;

use async_trait::async_trait;
use poststats_core::{AggregatedStats, AuthorFact, AuthorRank, PostRank, RankingMetric, StatFact};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::{
    count_from_db, limit_to_db, post_id_from_db, post_id_to_db, post_order_clause,
    AggregationStore, Result, StoreError,
};

/// SQLite-based aggregation store.
pub struct SqliteAggregationStore {
    pool: SqlitePool,
}

impl SqliteAggregationStore {
    /// Open (or create) the database file at `path`.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(path = %path.as_ref().display(), "SQLite aggregation store ready");
        Ok(Self { pool })
    }

    /// In-memory database (for testing).
    ///
    /// Each SQLite connection has its own private memory database, so the pool
    /// is pinned to a single connection that is never recycled.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AggregationStore for SqliteAggregationStore {
    async fn append_stat_facts(&self, facts: &[StatFact]) -> Result<()> {
        if facts.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for fact in facts {
            sqlx::query(
                "INSERT INTO stat_facts (post_id, viewed, liked, ingested_at) VALUES (?, ?, ?, ?)",
            )
            .bind(post_id_to_db(fact.post_id))
            .bind(fact.viewed as i64)
            .bind(fact.liked as i64)
            .bind(fact.ingested_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_author_fact(&self, fact: &AuthorFact) -> Result<()> {
        let inserted = sqlx::query(
            "INSERT INTO author_facts (post_id, author_login) VALUES (?, ?)
             ON CONFLICT(post_id) DO NOTHING",
        )
        .bind(post_id_to_db(fact.post_id))
        .bind(&fact.author_login)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            return Ok(());
        }

        let existing: String =
            sqlx::query_scalar("SELECT author_login FROM author_facts WHERE post_id = ?")
                .bind(post_id_to_db(fact.post_id))
                .fetch_one(&self.pool)
                .await?;

        if existing == fact.author_login {
            Ok(())
        } else {
            Err(StoreError::AttributionConflict {
                post_id: fact.post_id,
                existing,
                requested: fact.author_login.clone(),
            })
        }
    }

    async fn post_stats(&self, post_id: u64) -> Result<AggregatedStats> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(viewed), 0) AS views, COALESCE(SUM(liked), 0) AS likes
             FROM stat_facts WHERE post_id = ?",
        )
        .bind(post_id_to_db(post_id))
        .fetch_one(&self.pool)
        .await?;

        Ok(AggregatedStats {
            post_id,
            views: count_from_db(row.try_get("views")?)?,
            likes: count_from_db(row.try_get("likes")?)?,
        })
    }

    async fn top_posts(&self, metric: RankingMetric, limit: usize) -> Result<Vec<PostRank>> {
        let sql = format!(
            "SELECT s.post_id AS post_id, a.author_login AS author_login,
                    SUM(s.liked) AS likes, SUM(s.viewed) AS views
             FROM stat_facts s
             JOIN author_facts a ON a.post_id = s.post_id
             GROUP BY s.post_id, a.author_login
             ORDER BY {}
             LIMIT ?",
            post_order_clause(metric)
        );

        let rows = sqlx::query(&sql)
            .bind(limit_to_db(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<PostRank> {
                Ok(PostRank {
                    post_id: post_id_from_db(row.try_get("post_id")?),
                    author_login: row.try_get("author_login")?,
                    likes: count_from_db(row.try_get("likes")?)?,
                    views: count_from_db(row.try_get("views")?)?,
                })
            })
            .collect()
    }

    async fn top_authors(&self, limit: usize) -> Result<Vec<AuthorRank>> {
        let rows = sqlx::query(
            "SELECT a.author_login AS author_login, SUM(s.liked) AS likes
             FROM author_facts a
             JOIN stat_facts s ON s.post_id = a.post_id
             GROUP BY a.author_login
             ORDER BY likes DESC, a.author_login ASC
             LIMIT ?",
        )
        .bind(limit_to_db(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AuthorRank> {
                Ok(AuthorRank {
                    author_login: row.try_get("author_login")?,
                    likes: count_from_db(row.try_get("likes")?)?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
