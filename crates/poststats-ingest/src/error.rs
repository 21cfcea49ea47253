//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while reading the log or configuring ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The durable log could not be read or a position could not be committed.
    #[error("Source error: {0}")]
    Source(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        IngestError::Source(e.to_string())
    }
}
