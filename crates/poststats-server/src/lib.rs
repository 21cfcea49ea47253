//! PostStats Server
//!
//! One process hosting the whole statistics pipeline:
//!
//! ```text
//!  stats log ──▶ IngestionConsumer ──▶ AggregationStore ◀── RankingEngine ◀── gRPC :50051
//!                                             ▲                          ◀── HTTP :8001
//!                                             └── AttributionWriter ◀── gRPC AddPost
//! ```
//!
//! [`PostStats`] owns the shared components; [`run`] serves them until a
//! shutdown signal arrives.

pub mod config;
pub mod error;
pub mod http;
pub mod services;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use poststats_ingest::{
    IngestConfig, IngestMetrics, IngestionConsumer, MemoryLog, PartitionReader, StartOffset,
};
use poststats_query::{AttributionWriter, RankingEngine};
use poststats_store::{MemoryAggregationStore, SharedStore, SqliteAggregationStore};
use prometheus::Registry;
use tokio::task::JoinHandle;
use tonic::transport::Server as GrpcServer;

pub use config::{LogSource, ServerConfig, StoreBackend};
pub use error::{ApiError, Result, ServerError};
pub use services::StatsServiceImpl;
pub use shutdown::{ShutdownHandle, ShutdownSignal};

/// Shared components of a running service.
#[derive(Clone)]
pub struct PostStats {
    pub store: SharedStore,
    pub writer: AttributionWriter,
    pub engine: RankingEngine,
    pub registry: Registry,
    pub ingest_metrics: Arc<IngestMetrics>,
}

impl PostStats {
    pub fn new(store: SharedStore, query_timeout: Duration) -> Result<Self> {
        let registry = Registry::new();
        let ingest_metrics = Arc::new(IngestMetrics::new(&registry)?);

        Ok(Self {
            writer: AttributionWriter::new(store.clone(), query_timeout),
            engine: RankingEngine::new(store.clone(), query_timeout),
            store,
            registry,
            ingest_metrics,
        })
    }

    pub fn grpc_service(&self) -> StatsServiceImpl {
        StatsServiceImpl::new(self.writer.clone(), self.engine.clone())
    }

    pub fn http_router(&self) -> axum::Router {
        http::router(http::HttpState {
            engine: self.engine.clone(),
            registry: self.registry.clone(),
        })
    }

    /// Start the ingestion consumer on a background task.
    pub fn spawn_consumer(
        &self,
        reader: Box<dyn PartitionReader>,
        config: IngestConfig,
        shutdown: &ShutdownHandle,
    ) -> JoinHandle<poststats_ingest::Result<()>> {
        let consumer =
            IngestionConsumer::new(reader, self.store.clone(), config, self.ingest_metrics.clone());
        tokio::spawn(consumer.run(shutdown.subscribe()))
    }
}

/// Open the configured aggregation store.
pub async fn open_store(backend: &StoreBackend) -> Result<SharedStore> {
    match backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory aggregation store");
            Ok(Arc::new(MemoryAggregationStore::new()))
        }
        StoreBackend::Sqlite { path } => {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            tracing::info!(path = %path, "opening SQLite aggregation store");
            Ok(Arc::new(SqliteAggregationStore::new(path).await?))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres { url } => {
            tracing::info!("connecting to PostgreSQL aggregation store");
            Ok(Arc::new(
                poststats_store::PostgresAggregationStore::new(url).await?,
            ))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres { .. } => Err(ServerError::Config(
            "POSTSTATS_STORE=postgres requires the 'postgres' feature".to_string(),
        )),
    }
}

/// Open a reader for the configured log source.
///
/// The in-process log only serves events appended through `memory_log` by an
/// embedding caller, so it is read from the beginning. Without one there is
/// nothing to read and startup fails.
pub async fn open_log_reader(
    source: &LogSource,
    ingest: &IngestConfig,
    memory_log: Option<&MemoryLog>,
) -> Result<Box<dyn PartitionReader>> {
    match source {
        LogSource::Memory => {
            let log = memory_log.ok_or_else(|| {
                ServerError::Config(
                    "POSTSTATS_LOG_SOURCE=memory has no publisher; use kafka, or embed the \
                     server with run_with_log"
                        .to_string(),
                )
            })?;
            let reader = log.reader(ingest.partition, StartOffset::Earliest).await?;
            Ok(Box::new(reader))
        }
        #[cfg(feature = "kafka")]
        LogSource::Kafka { brokers } => {
            let config = poststats_ingest::KafkaReaderConfig {
                bootstrap_servers: brokers.clone(),
                topic: ingest.topic.clone(),
                partition: ingest.partition,
                ..Default::default()
            };
            Ok(Box::new(poststats_ingest::KafkaPartitionReader::new(config)?))
        }
        #[cfg(not(feature = "kafka"))]
        LogSource::Kafka { .. } => Err(ServerError::Config(
            "POSTSTATS_LOG_SOURCE=kafka requires building with --features kafka".to_string(),
        )),
    }
}

/// Serve gRPC and HTTP and run ingestion until `shutdown` fires.
pub async fn run(config: ServerConfig, shutdown: ShutdownHandle) -> Result<()> {
    serve(config, shutdown, None).await
}

/// Like [`run`], with an in-process log supplied by an embedding caller that
/// publishes events into it. Only read when the log source is `memory`.
pub async fn run_with_log(
    config: ServerConfig,
    shutdown: ShutdownHandle,
    memory_log: MemoryLog,
) -> Result<()> {
    serve(config, shutdown, Some(&memory_log)).await
}

async fn serve(
    config: ServerConfig,
    shutdown: ShutdownHandle,
    memory_log: Option<&MemoryLog>,
) -> Result<()> {
    // fail on the log source before touching the store
    let reader = open_log_reader(&config.log_source, &config.ingest, memory_log).await?;
    let store = open_store(&config.store).await?;
    let app = PostStats::new(store, config.query_timeout)?;
    let consumer = app.spawn_consumer(reader, config.ingest.clone(), &shutdown);

    let http_listener = tokio::net::TcpListener::bind(config.http_addr).await?;

    tracing::info!("PostStats server starting");
    tracing::info!("   gRPC:    {}", config.grpc_addr);
    tracing::info!("   HTTP:    http://{}", config.http_addr);
    tracing::info!("   Topic:   {}/{}", config.ingest.topic, config.ingest.partition);
    tracing::info!("   Query timeout: {:?}", config.query_timeout);

    let grpc = GrpcServer::builder()
        .add_service(app.grpc_service().into_server())
        .serve_with_shutdown(config.grpc_addr, shutdown.signalled());

    let http = axum::serve(http_listener, app.http_router())
        .with_graceful_shutdown(shutdown.signalled());

    let stop_on_error = shutdown.clone();
    let served = tokio::try_join!(
        async {
            grpc.await.map_err(|e| {
                stop_on_error.trigger(ShutdownSignal::Manual);
                ServerError::from(e)
            })
        },
        async {
            http.await.map_err(|e| {
                stop_on_error.trigger(ShutdownSignal::Manual);
                ServerError::from(e)
            })
        },
    );

    // the consumer stops at the next batch boundary
    shutdown.trigger(ShutdownSignal::Manual);
    match tokio::time::timeout(config.shutdown_timeout, consumer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "ingestion consumer failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "ingestion consumer task panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "ingestion consumer did not stop in time"
        ),
    }

    served?;
    tracing::info!("PostStats server shut down gracefully");
    Ok(())
}
