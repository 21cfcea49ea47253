//! Envelope Error Types
//!
//! Every way a stat event payload can fail to become a [`StatEvent`].
//! None of these are fatal to ingestion: the consumer logs the error and
//! moves on to the next message.
//!
//! [`StatEvent`]: crate::codec::StatEvent

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty event payload")]
    Empty,

    #[error("malformed event payload: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("field {field} out of range: {value} (expected 0 or 1)")]
    FieldOutOfRange { field: &'static str, value: u64 },
}
