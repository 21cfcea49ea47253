//! PostStats server binary.
//!
//! Serves `poststats.StatsService` over gRPC, the HTTP read path, and runs
//! the ingestion consumer in the background. Configuration comes from the
//! environment (see [`poststats_server::config`]).
//!
//! ## Example Usage
//! ```bash
//! # SQLite store, StatsTopic/0 on kafka:9092
//! cargo run -p poststats-server --features kafka --release
//!
//! # In-memory store, local broker
//! POSTSTATS_STORE=memory POSTSTATS_KAFKA_BROKERS=localhost:9092 \
//!     cargo run -p poststats-server --features kafka
//! ```
//!
//! ## Logging
//! Controlled by `RUST_LOG` (default `info`):
//! ```bash
//! RUST_LOG=poststats_ingest=debug cargo run -p poststats-server
//! ```

use poststats_server::shutdown::shutdown_signal;
use poststats_server::{ServerConfig, ShutdownHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let shutdown = ShutdownHandle::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        tracing::info!("Received {}, initiating graceful shutdown", signal);
        on_signal.trigger(signal);
    });

    poststats_server::run(config, shutdown).await?;

    Ok(())
}
