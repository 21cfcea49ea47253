//! Attribution writer.
//!
//! Records the author of a post at creation time. The write is synchronous:
//! the caller learns about a failure immediately and decides whether to
//! retry the whole creation flow.

use std::time::Duration;

use poststats_core::AuthorFact;
use poststats_store::SharedStore;

use crate::error::{QueryError, Result};

#[derive(Clone)]
pub struct AttributionWriter {
    store: SharedStore,
    timeout: Duration,
}

impl AttributionWriter {
    pub fn new(store: SharedStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Attribute `post_id` to `author_login`.
    ///
    /// Repeating an existing pair succeeds. A different author for an
    /// attributed post yields `AttributionConflict`.
    #[tracing::instrument(skip(self))]
    pub async fn add_post(&self, post_id: u64, author_login: &str) -> Result<()> {
        if author_login.trim().is_empty() {
            return Err(QueryError::InvalidArgument(
                "author_login must not be empty".to_string(),
            ));
        }

        let fact = AuthorFact::new(post_id, author_login);
        let write = self.store.insert_author_fact(&fact);

        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => {
                tracing::debug!("post attributed");
                Ok(())
            }
            Ok(Err(e)) => {
                let err = QueryError::from_attribution(e);
                tracing::warn!(error = %err, "attribution write failed");
                Err(err)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "attribution write timed out"
                );
                Err(QueryError::DeadlineExceeded(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poststats_core::RankingMetric;
    use poststats_store::{AggregationStore, MemoryAggregationStore};
    use std::sync::Arc;

    fn writer_over(store: Arc<MemoryAggregationStore>) -> AttributionWriter {
        AttributionWriter::new(store, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_add_post_writes_author_fact() {
        let store = Arc::new(MemoryAggregationStore::new());
        let writer = writer_over(store.clone());

        writer.add_post(10, "alice").await.unwrap();
        store
            .append_stat_facts(&[poststats_core::StatFact {
                post_id: 10,
                viewed: 1,
                liked: 1,
                ingested_at: 0,
            }])
            .await
            .unwrap();

        let top = store.top_posts(RankingMetric::Likes, 3).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].author_login, "alice");
    }

    #[tokio::test]
    async fn test_add_post_is_idempotent() {
        let store = Arc::new(MemoryAggregationStore::new());
        let writer = writer_over(store);

        writer.add_post(10, "alice").await.unwrap();
        writer.add_post(10, "alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_add_post_conflict() {
        let store = Arc::new(MemoryAggregationStore::new());
        let writer = writer_over(store);

        writer.add_post(10, "alice").await.unwrap();
        let err = writer.add_post(10, "bob").await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::AttributionConflict { post_id: 10, ref existing } if existing == "alice"
        ));
    }

    #[tokio::test]
    async fn test_add_post_rejects_empty_login() {
        let store = Arc::new(MemoryAggregationStore::new());
        let writer = writer_over(store);

        for login in ["", "   "] {
            let err = writer.add_post(1, login).await.unwrap_err();
            assert!(matches!(err, QueryError::InvalidArgument(_)));
        }
    }
}
