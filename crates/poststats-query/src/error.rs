//! Query Error Types
//!
//! ## Error Categories
//!
//! ### Caller errors
//! - `InvalidArgument`: unknown metric, empty author login
//! - `AttributionConflict`: post already attributed to someone else
//!
//! ### Availability
//! - `StoreUnavailable`: transient store failure on the read path
//! - `AttributionWriteFailed`: the attribution could not be written
//! - `DeadlineExceeded`: the store did not answer in time
//!
//! ### Everything else
//! - `Store`: non-transient store failure on the read path
//!
//! Read queries never retry; the error goes straight back to the caller.

use std::time::Duration;

use poststats_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Attribution write failed: {0}")]
    AttributionWriteFailed(String),

    #[error("Post {post_id} is already attributed to {existing}")]
    AttributionConflict { post_id: u64, existing: String },

    #[error("Deadline exceeded after {}ms", .0.as_millis())]
    DeadlineExceeded(Duration),

    #[error("Store error: {0}")]
    Store(StoreError),
}

/// Read-path classification of store failures.
impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            QueryError::StoreUnavailable(e.to_string())
        } else {
            QueryError::Store(e)
        }
    }
}

impl QueryError {
    /// Write-path classification of store failures.
    pub(crate) fn from_attribution(e: StoreError) -> Self {
        match e {
            StoreError::AttributionConflict {
                post_id, existing, ..
            } => QueryError::AttributionConflict { post_id, existing },
            other => QueryError::AttributionWriteFailed(other.to_string()),
        }
    }
}
