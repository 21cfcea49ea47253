//! Aggregation Store Error Types
//!
//! ## Error Categories
//!
//! ### Availability
//! - `Unavailable`: the backend cannot be reached right now
//! - `Database`: a SQLx operation failed (may or may not be transient)
//!
//! ### Data
//! - `AttributionConflict`: post already attributed to a different author
//! - `Internal`: a fact the backend refuses to store, or a corrupt row
//!
//! ### Setup
//! - `Migration`: schema bootstrap failed on startup
//!
//! [`StoreError::is_transient`] separates an outage (the query layer answers
//! "unavailable") from a failure that retrying will not change. The ingestion
//! loop does not consult it: every failed write is retried.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Post {post_id} is already attributed to {existing}, cannot attribute to {requested}")]
    AttributionConflict {
        post_id: u64,
        existing: String,
        requested: String,
    },

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e.to_string())
    }
}

impl StoreError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => is_transient_sqlx(e),
            StoreError::Migration(_)
            | StoreError::AttributionConflict { .. }
            | StoreError::Internal(_) => false,
        }
    }
}

fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| is_transient_db_code(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// PostgreSQL SQLSTATEs for connection loss, serialization failure, deadlock,
/// resource exhaustion, admin shutdown and system errors; SQLite BUSY, LOCKED,
/// READONLY, IOERR, FULL and CANTOPEN (including their extended codes).
fn is_transient_db_code(code: &str) -> bool {
    // SQLSTATEs are always five characters; SQLite codes are shorter.
    if code.len() == 5 {
        return code.starts_with("08")
            || code.starts_with("53")
            || code.starts_with("57P")
            || code.starts_with("58")
            || code == "40001"
            || code == "40P01";
    }
    match code.parse::<i32>() {
        Ok(sqlite_code) => matches!(sqlite_code & 0xff, 5 | 6 | 8 | 10 | 13 | 14),
        Err(_) => false,
    }
}
