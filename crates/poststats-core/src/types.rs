//! Domain Types
//!
//! Stored facts and the computed views built from them.
//!
//! ## Facts
//!
//! - [`StatFact`]: one row per ingested event, never updated or deleted
//! - [`AuthorFact`]: post → author attribution, written once at post creation
//!
//! ## Views (computed on demand, never persisted)
//!
//! - [`AggregatedStats`]: per-post totals
//! - [`PostRank`]: one entry of a top-posts ranking
//! - [`AuthorRank`]: one entry of a top-authors ranking

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::StatEvent;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One ingested observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFact {
    pub post_id: u64,
    pub viewed: u64,
    pub liked: u64,
    /// Milliseconds since the Unix epoch, assigned by the consumer.
    pub ingested_at: i64,
}

impl StatFact {
    pub fn from_event(event: &StatEvent, ingested_at: i64) -> Self {
        Self {
            post_id: event.post_id,
            viewed: event.viewed,
            liked: event.liked,
            ingested_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorFact {
    pub post_id: u64,
    pub author_login: String,
}

impl AuthorFact {
    pub fn new(post_id: u64, author_login: impl Into<String>) -> Self {
        Self {
            post_id,
            author_login: author_login.into(),
        }
    }
}

/// View/like totals for a single post.
///
/// A post with no facts yields zero totals rather than a not-found error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    pub post_id: u64,
    pub views: u64,
    pub likes: u64,
}

impl AggregatedStats {
    pub fn empty(post_id: u64) -> Self {
        Self {
            post_id,
            views: 0,
            likes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRank {
    pub post_id: u64,
    pub author_login: String,
    pub likes: u64,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRank {
    pub author_login: String,
    pub likes: u64,
}

/// Metric a post ranking is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMetric {
    Likes,
    Views,
}

impl RankingMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMetric::Likes => "likes",
            RankingMetric::Views => "views",
        }
    }
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ranking metric: {0:?} (expected \"likes\" or \"views\")")]
pub struct ParseMetricError(pub String);

impl FromStr for RankingMetric {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("likes") {
            Ok(RankingMetric::Likes)
        } else if s.eq_ignore_ascii_case("views") {
            Ok(RankingMetric::Views)
        } else {
            Err(ParseMetricError(s.to_string()))
        }
    }
}
