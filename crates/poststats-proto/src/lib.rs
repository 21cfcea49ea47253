//! PostStats Protocol Buffer Definitions
//!
//! gRPC service and message types for `poststats.StatsService`, served by
//! `poststats-server` on port 50051.
//!
//! ## Usage
//!
//! ```ignore
//! use poststats_proto::poststats::{
//!     stats_service_client::StatsServiceClient, GetTopPostsRequest,
//! };
//!
//! let mut client = StatsServiceClient::connect("http://localhost:50051").await?;
//! let top = client
//!     .get_top_posts(GetTopPostsRequest { metric: "likes".to_string() })
//!     .await?
//!     .into_inner();
//! for post in top.posts {
//!     println!("{} by {}: {} likes", post.post_id, post.author_login, post.likes);
//! }
//! ```

pub mod poststats {
    tonic::include_proto!("poststats");
}

pub use poststats::stats_service_client::StatsServiceClient;
pub use poststats::stats_service_server::{StatsService, StatsServiceServer};
