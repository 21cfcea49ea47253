//! PostStats query side.
//!
//! - [`AttributionWriter`]: synchronous post to author attribution
//! - [`RankingEngine`]: post totals and top-N rankings under a deadline
//!
//! Both take a [`poststats_store::SharedStore`] at construction and hold no
//! other state.

pub mod attribution;
pub mod engine;
pub mod error;

pub use attribution::AttributionWriter;
pub use engine::{clamp_limit, parse_metric, RankingEngine, DEFAULT_QUERY_TIMEOUT, MAX_LIMIT};
pub use error::{QueryError, Result};
