//! `poststats.StatsService` gRPC implementation.

use std::time::Duration;

use poststats_core::{AggregatedStats, AuthorRank, PostRank};
use poststats_proto::poststats::{
    AddPostRequest, AddPostResponse, GetPostStatsRequest, GetTopAuthorsRequest,
    GetTopPostsRequest, PostStats, TopAuthor, TopAuthorsResponse, TopPost, TopPostsResponse,
};
use poststats_proto::{StatsService, StatsServiceServer};
use poststats_query::{AttributionWriter, QueryError, RankingEngine};
use tonic::{Request, Response, Status};
use tracing::debug;

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// gRPC front for the attribution writer and ranking engine.
#[derive(Clone)]
pub struct StatsServiceImpl {
    writer: AttributionWriter,
    engine: RankingEngine,
}

impl StatsServiceImpl {
    pub fn new(writer: AttributionWriter, engine: RankingEngine) -> Self {
        Self { writer, engine }
    }

    pub fn into_server(self) -> StatsServiceServer<Self> {
        StatsServiceServer::new(self)
    }

    fn engine_for<T>(&self, request: &Request<T>) -> RankingEngine {
        self.engine.with_deadline(caller_deadline(request))
    }
}

/// Map a query failure onto the gRPC status the caller sees.
pub fn query_status(err: QueryError) -> Status {
    match err {
        QueryError::InvalidArgument(msg) => Status::invalid_argument(msg),
        QueryError::AttributionConflict { .. } => Status::already_exists(err.to_string()),
        QueryError::StoreUnavailable(_) | QueryError::AttributionWriteFailed(_) => {
            Status::unavailable(err.to_string())
        }
        QueryError::DeadlineExceeded(_) => Status::deadline_exceeded(err.to_string()),
        QueryError::Store(_) => Status::internal(err.to_string()),
    }
}

/// Deadline the client attached to the call, if any.
pub fn caller_deadline<T>(request: &Request<T>) -> Option<Duration> {
    request
        .metadata()
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout)
}

/// Parse a `grpc-timeout` value: up to 8 digits followed by a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let amount: u64 = digits.parse().ok()?;

    let duration = match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}

fn to_post_stats(stats: AggregatedStats) -> PostStats {
    PostStats {
        post_id: stats.post_id,
        views: stats.views,
        likes: stats.likes,
    }
}

fn to_top_post(rank: PostRank) -> TopPost {
    TopPost {
        post_id: rank.post_id,
        author_login: rank.author_login,
        likes: rank.likes,
        views: rank.views,
    }
}

fn to_top_author(rank: AuthorRank) -> TopAuthor {
    TopAuthor {
        author_login: rank.author_login,
        likes: rank.likes,
    }
}

#[tonic::async_trait]
impl StatsService for StatsServiceImpl {
    async fn add_post(
        &self,
        request: Request<AddPostRequest>,
    ) -> Result<Response<AddPostResponse>, Status> {
        let req = request.into_inner();
        debug!(post_id = req.post_id, author = %req.author_login, "AddPost");

        self.writer
            .add_post(req.post_id, &req.author_login)
            .await
            .map_err(query_status)?;

        Ok(Response::new(AddPostResponse {}))
    }

    async fn get_post_stats(
        &self,
        request: Request<GetPostStatsRequest>,
    ) -> Result<Response<PostStats>, Status> {
        let engine = self.engine_for(&request);
        let post_id = request.into_inner().post_id;

        let stats = engine.post_stats(post_id).await.map_err(query_status)?;
        Ok(Response::new(to_post_stats(stats)))
    }

    async fn get_top_posts(
        &self,
        request: Request<GetTopPostsRequest>,
    ) -> Result<Response<TopPostsResponse>, Status> {
        let engine = self.engine_for(&request);
        let metric = request.into_inner().metric;

        let posts = engine
            .top_posts_by_name(&metric)
            .await
            .map_err(query_status)?;

        Ok(Response::new(TopPostsResponse {
            posts: posts.into_iter().map(to_top_post).collect(),
        }))
    }

    async fn get_top_authors(
        &self,
        request: Request<GetTopAuthorsRequest>,
    ) -> Result<Response<TopAuthorsResponse>, Status> {
        let engine = self.engine_for(&request);

        let authors = engine.top_authors().await.map_err(query_status)?;

        Ok(Response::new(TopAuthorsResponse {
            authors: authors.into_iter().map(to_top_author).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poststats_store::StoreError;
    use tonic::Code;

    #[test]
    fn test_parse_grpc_timeout() {
        assert_eq!(parse_grpc_timeout("500m"), Some(Duration::from_millis(500)));
        assert_eq!(parse_grpc_timeout("2S"), Some(Duration::from_secs(2)));
        assert_eq!(parse_grpc_timeout("1M"), Some(Duration::from_secs(60)));
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("250u"), Some(Duration::from_micros(250)));
        assert_eq!(parse_grpc_timeout("99999999n"), Some(Duration::from_nanos(99_999_999)));

        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("m"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
        assert_eq!(parse_grpc_timeout("-5S"), None);
    }

    #[test]
    fn test_caller_deadline_from_metadata() {
        let mut request = Request::new(GetTopAuthorsRequest {});
        assert_eq!(caller_deadline(&request), None);

        request
            .metadata_mut()
            .insert(GRPC_TIMEOUT_HEADER, "100m".parse().unwrap());
        assert_eq!(caller_deadline(&request), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_query_status_mapping() {
        let cases = [
            (QueryError::InvalidArgument("x".to_string()), Code::InvalidArgument),
            (
                QueryError::AttributionConflict {
                    post_id: 1,
                    existing: "alice".to_string(),
                },
                Code::AlreadyExists,
            ),
            (QueryError::StoreUnavailable("x".to_string()), Code::Unavailable),
            (QueryError::AttributionWriteFailed("x".to_string()), Code::Unavailable),
            (
                QueryError::DeadlineExceeded(Duration::from_secs(1)),
                Code::DeadlineExceeded,
            ),
            (
                QueryError::Store(StoreError::Internal("x".to_string())),
                Code::Internal,
            ),
        ];

        for (err, code) in cases {
            assert_eq!(query_status(err).code(), code);
        }
    }
}
