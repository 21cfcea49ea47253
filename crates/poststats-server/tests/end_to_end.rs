//! End-to-end pipeline tests.
//!
//! Events go into an in-process log, the ingestion consumer moves them into a
//! SQLite aggregation store, and a real gRPC client reads the results over
//! TCP.
//!
//! ## Test Scenarios
//!
//! 1. **events_flow_from_log_to_grpc_client**: full path, with a corrupt
//!    message in the middle of the stream
//! 2. **server_starts_and_stops_cleanly**: `run_with_log` honours shutdown
//! 3. **run_refuses_memory_log_without_publisher**: the bare binary path
//!    never serves an in-process log nothing can append to

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use poststats_core::StatEvent;
use poststats_ingest::{IngestConfig, MemoryLog, StartOffset};
use poststats_proto::poststats::{
    AddPostRequest, GetPostStatsRequest, GetTopAuthorsRequest, GetTopPostsRequest,
};
use poststats_proto::StatsServiceClient;
use poststats_server::{
    run, run_with_log, LogSource, PostStats, ServerConfig, ServerError, ShutdownHandle,
    ShutdownSignal, StoreBackend,
};
use poststats_store::SqliteAggregationStore;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};

async fn wait_for_views_likes(
    client: &mut StatsServiceClient<Channel>,
    post_id: u64,
    expected: (u64, u64),
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = client
            .get_post_stats(GetPostStatsRequest { post_id })
            .await
            .unwrap()
            .into_inner();
        if (stats.views, stats.likes) == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "post {post_id}: expected {expected:?}, got ({}, {})",
            stats.views,
            stats.likes
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn events_flow_from_log_to_grpc_client() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteAggregationStore::new(dir.path().join("poststats.db"))
        .await
        .unwrap();
    let app = PostStats::new(Arc::new(store), Duration::from_secs(3)).unwrap();
    let shutdown = ShutdownHandle::new();

    // ingestion
    let log = MemoryLog::new("StatsTopic", 1);
    let reader = log.reader(0, StartOffset::Latest).await.unwrap();
    let ingest_config = IngestConfig {
        poll_interval: Duration::from_millis(5),
        ..IngestConfig::default()
    };
    let consumer = app.spawn_consumer(Box::new(reader), ingest_config, &shutdown);

    // gRPC on an ephemeral port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(
        Server::builder()
            .add_service(app.grpc_service().into_server())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown.signalled()),
    );
    let mut client = StatsServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    // gateway: create posts, then publish events
    for (post_id, login) in [(1, "alice"), (2, "bob")] {
        client
            .add_post(AddPostRequest {
                post_id,
                author_login: login.to_string(),
            })
            .await
            .unwrap();
    }

    log.append_event(0, &StatEvent::new(1, 1, 0)).await.unwrap();
    log.append(0, Bytes::from_static(&[0x08, 0x80]))
        .await
        .unwrap();
    log.append_event(0, &StatEvent::new(1, 0, 1)).await.unwrap();
    log.append_event(0, &StatEvent::like(1)).await.unwrap();
    log.append_event(0, &StatEvent::like(1)).await.unwrap();
    log.append_event(0, &StatEvent::like(2)).await.unwrap();

    wait_for_views_likes(&mut client, 1, (1, 3)).await;
    wait_for_views_likes(&mut client, 2, (0, 1)).await;
    assert_eq!(app.ingest_metrics.skipped.get(), 1);

    let authors = client
        .get_top_authors(GetTopAuthorsRequest {})
        .await
        .unwrap()
        .into_inner()
        .authors;
    let rows: Vec<(&str, u64)> = authors
        .iter()
        .map(|a| (a.author_login.as_str(), a.likes))
        .collect();
    assert_eq!(rows, vec![("alice", 3), ("bob", 1)]);

    let posts = client
        .get_top_posts(GetTopPostsRequest {
            metric: "LIKES".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .posts;
    assert_eq!(posts[0].post_id, 1);
    assert_eq!(posts[0].author_login, "alice");

    let status = client
        .get_top_posts(GetTopPostsRequest {
            metric: "comments".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);

    shutdown.trigger(ShutdownSignal::Manual);
    tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    drop(client);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

fn local_config(log_source: LogSource) -> ServerConfig {
    ServerConfig {
        grpc_addr: "127.0.0.1:0".parse().unwrap(),
        http_addr: "127.0.0.1:0".parse().unwrap(),
        store: StoreBackend::Memory,
        log_source,
        ingest: IngestConfig::default(),
        query_timeout: Duration::from_secs(1),
        shutdown_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn server_starts_and_stops_cleanly() {
    let config = local_config(LogSource::Memory);
    let shutdown = ShutdownHandle::new();
    let log = MemoryLog::new("StatsTopic", 1);

    let running = tokio::spawn(run_with_log(config, shutdown.clone(), log));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!running.is_finished());

    shutdown.trigger(ShutdownSignal::Manual);
    tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn run_refuses_memory_log_without_publisher() {
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run(local_config(LogSource::Memory), ShutdownHandle::new()),
    )
    .await
    .unwrap();

    match result {
        Err(ServerError::Config(message)) => assert!(message.contains("run_with_log")),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[cfg(not(feature = "kafka"))]
#[tokio::test]
async fn kafka_source_needs_the_kafka_feature() {
    let config = local_config(LogSource::Kafka {
        brokers: "localhost:9092".to_string(),
    });
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run(config, ShutdownHandle::new()),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(ServerError::Config(_))));
}
