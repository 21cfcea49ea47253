//! PostStats core types.
//!
//! The stat event envelope, the facts the aggregation store keeps, and the
//! ranking order every backend agrees on.

pub mod codec;
pub mod error;
pub mod ranking;
pub mod types;

pub use codec::StatEvent;
pub use error::{DecodeError, Result};
pub use ranking::TOP_N;
pub use types::{
    now_ms, AggregatedStats, AuthorFact, AuthorRank, ParseMetricError, PostRank, RankingMetric,
    StatFact,
};
