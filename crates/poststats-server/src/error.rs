//! Server error types.
//!
//! [`ServerError`] covers startup and serving failures. [`ApiError`] is what
//! HTTP handlers return; it renders as a JSON body:
//!
//! ```json
//! { "error_code": 40001, "message": "invalid post id 'abc'" }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use poststats_ingest::IngestError;
use poststats_query::QueryError;
use poststats_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid post id '{0}'")]
    InvalidPostId(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::InvalidPostId(_) => (StatusCode::BAD_REQUEST, 40001),
            ApiError::Query(QueryError::InvalidArgument(_)) => (StatusCode::BAD_REQUEST, 40002),
            ApiError::Query(QueryError::AttributionConflict { .. }) => (StatusCode::CONFLICT, 409),
            ApiError::Query(QueryError::StoreUnavailable(_))
            | ApiError::Query(QueryError::AttributionWriteFailed(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, 50301)
            }
            ApiError::Query(QueryError::DeadlineExceeded(_)) => (StatusCode::GATEWAY_TIMEOUT, 50401),
            ApiError::Query(QueryError::Store(_)) => (StatusCode::INTERNAL_SERVER_ERROR, 50001),
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (ApiError::InvalidPostId("x".to_string()), StatusCode::BAD_REQUEST),
            (
                QueryError::InvalidArgument("metric".to_string()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                QueryError::StoreUnavailable("down".to_string()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                QueryError::DeadlineExceeded(Duration::from_secs(3)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                QueryError::Store(StoreError::Internal("bad".to_string())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Config("bad addr".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad addr");
    }
}
