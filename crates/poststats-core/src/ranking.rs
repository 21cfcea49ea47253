//! Ranking Rules
//!
//! The ordering every aggregation store backend must produce, plus a
//! reference implementation over in-memory totals.
//!
//! ## Ordering
//!
//! Posts: primary metric descending, then the other metric descending, then
//! `post_id` ascending.
//!
//! Authors: summed likes descending, then `author_login` ascending (byte
//! order).
//!
//! Only posts with an attribution take part in either ranking (inner join).
//! A post that has stats but no author is invisible here until its
//! attribution arrives.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{AggregatedStats, AuthorRank, PostRank, RankingMetric};

/// Number of entries returned by the ranking RPCs.
pub const TOP_N: usize = 3;

/// Ordering of two post ranking entries, best first.
pub fn compare_posts(a: &PostRank, b: &PostRank, metric: RankingMetric) -> Ordering {
    let (primary, secondary) = match metric {
        RankingMetric::Likes => (b.likes.cmp(&a.likes), b.views.cmp(&a.views)),
        RankingMetric::Views => (b.views.cmp(&a.views), b.likes.cmp(&a.likes)),
    };
    primary
        .then(secondary)
        .then_with(|| a.post_id.cmp(&b.post_id))
}

/// Ordering of two author ranking entries, best first.
pub fn compare_authors(a: &AuthorRank, b: &AuthorRank) -> Ordering {
    b.likes
        .cmp(&a.likes)
        .then_with(|| a.author_login.as_bytes().cmp(b.author_login.as_bytes()))
}

/// Join per-post totals with attributions and return the best `limit` posts.
pub fn rank_posts<I>(
    totals: I,
    authors: &HashMap<u64, String>,
    metric: RankingMetric,
    limit: usize,
) -> Vec<PostRank>
where
    I: IntoIterator<Item = AggregatedStats>,
{
    let mut ranked: Vec<PostRank> = totals
        .into_iter()
        .filter_map(|stats| {
            authors.get(&stats.post_id).map(|login| PostRank {
                post_id: stats.post_id,
                author_login: login.clone(),
                likes: stats.likes,
                views: stats.views,
            })
        })
        .collect();

    ranked.sort_by(|a, b| compare_posts(a, b, metric));
    ranked.truncate(limit);
    ranked
}

/// Sum likes per author across attributed posts and return the best `limit`.
pub fn rank_authors<I>(totals: I, authors: &HashMap<u64, String>, limit: usize) -> Vec<AuthorRank>
where
    I: IntoIterator<Item = AggregatedStats>,
{
    let mut per_author: HashMap<&str, u64> = HashMap::new();
    for stats in totals {
        if let Some(login) = authors.get(&stats.post_id) {
            let likes = per_author.entry(login.as_str()).or_insert(0);
            *likes = likes.saturating_add(stats.likes);
        }
    }

    let mut ranked: Vec<AuthorRank> = per_author
        .into_iter()
        .map(|(login, likes)| AuthorRank {
            author_login: login.to_string(),
            likes,
        })
        .collect();

    ranked.sort_by(compare_authors);
    ranked.truncate(limit);
    ranked
}
