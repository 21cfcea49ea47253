//! In-Memory Aggregation Store
//!
//! Column-oriented fact table held in process memory.
//!
//! ## Layout
//!
//! ```text
//! stat facts (one Vec per column, row i across all four)
//! ┌─────────┬────────┬───────┬─────────────┐
//! │ post_id │ viewed │ liked │ ingested_at │
//! ├─────────┼────────┼───────┼─────────────┤
//! │   1     │   1    │   0   │ 1700000000  │
//! │   1     │   0    │   1   │ 1700000005  │
//! │   2     │   1    │   0   │ 1700000005  │
//! └─────────┴────────┴───────┴─────────────┘
//!
//! author facts: HashMap<post_id, author_login>
//! ```
//!
//! Aggregation scans the `post_id`/`viewed`/`liked` columns; rankings are
//! produced by [`poststats_core::ranking`].
//!
//! Each append holds the write lock for the whole batch, so readers see the
//! batch entirely or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use poststats_core::ranking::{rank_authors, rank_posts};
use poststats_core::{AggregatedStats, AuthorFact, AuthorRank, PostRank, RankingMetric, StatFact};
use tokio::sync::RwLock;

use crate::{AggregationStore, Result, StoreError};

#[derive(Debug, Default)]
struct FactColumns {
    post_id: Vec<u64>,
    viewed: Vec<u64>,
    liked: Vec<u64>,
    ingested_at: Vec<i64>,
}

impl FactColumns {
    fn len(&self) -> usize {
        self.post_id.len()
    }

    fn push(&mut self, fact: &StatFact) {
        self.post_id.push(fact.post_id);
        self.viewed.push(fact.viewed);
        self.liked.push(fact.liked);
        self.ingested_at.push(fact.ingested_at);
    }

    fn totals(&self) -> HashMap<u64, AggregatedStats> {
        let mut totals: HashMap<u64, AggregatedStats> = HashMap::new();
        for i in 0..self.len() {
            let post_id = self.post_id[i];
            let entry = totals
                .entry(post_id)
                .or_insert_with(|| AggregatedStats::empty(post_id));
            entry.views = entry.views.saturating_add(self.viewed[i]);
            entry.likes = entry.likes.saturating_add(self.liked[i]);
        }
        totals
    }
}

/// Aggregation store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryAggregationStore {
    facts: RwLock<FactColumns>,
    authors: RwLock<HashMap<u64, String>>,
}

impl MemoryAggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stat fact rows stored.
    pub async fn fact_count(&self) -> usize {
        self.facts.read().await.len()
    }

    /// Ingestion timestamps of every fact for `post_id`, in insertion order.
    pub async fn ingested_at(&self, post_id: u64) -> Vec<i64> {
        let facts = self.facts.read().await;
        facts
            .post_id
            .iter()
            .zip(facts.ingested_at.iter())
            .filter(|(id, _)| **id == post_id)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl AggregationStore for MemoryAggregationStore {
    async fn append_stat_facts(&self, facts: &[StatFact]) -> Result<()> {
        if let Some(bad) = facts.iter().find(|f| f.viewed > 1 || f.liked > 1) {
            return Err(StoreError::Internal(format!(
                "stat fact for post {} has viewed={} liked={}",
                bad.post_id, bad.viewed, bad.liked
            )));
        }

        let mut columns = self.facts.write().await;
        for fact in facts {
            columns.push(fact);
        }
        Ok(())
    }

    async fn insert_author_fact(&self, fact: &AuthorFact) -> Result<()> {
        let mut authors = self.authors.write().await;
        match authors.get(&fact.post_id) {
            Some(existing) if *existing == fact.author_login => Ok(()),
            Some(existing) => Err(StoreError::AttributionConflict {
                post_id: fact.post_id,
                existing: existing.clone(),
                requested: fact.author_login.clone(),
            }),
            None => {
                authors.insert(fact.post_id, fact.author_login.clone());
                Ok(())
            }
        }
    }

    async fn post_stats(&self, post_id: u64) -> Result<AggregatedStats> {
        let facts = self.facts.read().await;
        let mut stats = AggregatedStats::empty(post_id);
        for i in 0..facts.len() {
            if facts.post_id[i] == post_id {
                stats.views = stats.views.saturating_add(facts.viewed[i]);
                stats.likes = stats.likes.saturating_add(facts.liked[i]);
            }
        }
        Ok(stats)
    }

    async fn top_posts(&self, metric: RankingMetric, limit: usize) -> Result<Vec<PostRank>> {
        let totals = self.facts.read().await.totals();
        let authors = self.authors.read().await;
        Ok(rank_posts(totals.into_values(), &authors, metric, limit))
    }

    async fn top_authors(&self, limit: usize) -> Result<Vec<AuthorRank>> {
        let totals = self.facts.read().await.totals();
        let authors = self.authors.read().await;
        Ok(rank_authors(totals.into_values(), &authors, limit))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
