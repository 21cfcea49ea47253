//! HTTP read path.
//!
//! | Route                                  | Response                               |
//! |----------------------------------------|----------------------------------------|
//! | `GET /stats/:post_id`                  | `{"postId":1,"views":2,"likes":1}`     |
//! | `GET /cheat/:post_id`                  | same as `/stats/:post_id`              |
//! | `GET /top/posts?metric=likes&limit=3`  | ranked posts                           |
//! | `GET /top/authors?limit=3`             | ranked authors                         |
//! | `GET /health`                          | `200 OK` or `503`                      |
//! | `GET /metrics`                         | Prometheus text format                 |

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use poststats_core::{AggregatedStats, AuthorRank, PostRank, RankingMetric, TOP_N};
use poststats_query::{parse_metric, RankingEngine};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

#[derive(Clone)]
pub struct HttpState {
    pub engine: RankingEngine,
    pub registry: Registry,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/stats/:post_id", get(post_stats))
        .route("/cheat/:post_id", get(post_stats))
        .route("/top/posts", get(top_posts))
        .route("/top/authors", get(top_authors))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct TopPostsParams {
    metric: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TopAuthorsParams {
    limit: Option<usize>,
}

async fn post_stats(
    State(state): State<HttpState>,
    Path(raw_id): Path<String>,
) -> Result<Json<AggregatedStats>, ApiError> {
    let post_id = raw_id
        .parse::<u64>()
        .map_err(|_| ApiError::InvalidPostId(raw_id.clone()))?;

    let stats = state.engine.post_stats(post_id).await?;
    Ok(Json(stats))
}

async fn top_posts(
    State(state): State<HttpState>,
    Query(params): Query<TopPostsParams>,
) -> Result<Json<Vec<PostRank>>, ApiError> {
    let metric = match params.metric.as_deref() {
        Some(name) => parse_metric(name)?,
        None => RankingMetric::Likes,
    };
    let limit = params.limit.unwrap_or(TOP_N);

    let posts = state.engine.top_posts_limited(metric, limit).await?;
    Ok(Json(posts))
}

async fn top_authors(
    State(state): State<HttpState>,
    Query(params): Query<TopAuthorsParams>,
) -> Result<Json<Vec<AuthorRank>>, ApiError> {
    let limit = params.limit.unwrap_or(TOP_N);

    let authors = state.engine.top_authors_limited(limit).await?;
    Ok(Json(authors))
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.engine.ping().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

async fn metrics(State(state): State<HttpState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type())],
            buffer,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}
