//! Server configuration from environment variables.
//!
//! | Variable                     | Default               |
//! |------------------------------|-----------------------|
//! | `POSTSTATS_GRPC_ADDR`        | `0.0.0.0:50051`       |
//! | `POSTSTATS_HTTP_ADDR`        | `0.0.0.0:8001`        |
//! | `POSTSTATS_STORE`            | `sqlite` (`memory`, `sqlite`, `postgres`) |
//! | `POSTSTATS_SQLITE_PATH`      | `./data/poststats.db` |
//! | `POSTSTATS_DATABASE_URL`     | required for `postgres` |
//! | `POSTSTATS_LOG_SOURCE`       | `kafka` (`kafka`, `memory`) |
//! | `POSTSTATS_KAFKA_BROKERS`    | `kafka:9092`          |
//! | `POSTSTATS_TOPIC`            | `StatsTopic`          |
//! | `POSTSTATS_PARTITION`        | `0`                   |
//! | `POSTSTATS_MAX_POLL_RECORDS` | `500`                 |
//! | `POSTSTATS_POLL_INTERVAL_MS` | `100`                 |
//! | `POSTSTATS_RETRY_INITIAL_BACKOFF_MS` | `100`         |
//! | `POSTSTATS_RETRY_MAX_BACKOFF_MS`     | `30000`       |
//! | `POSTSTATS_RETRY_BACKOFF_MULTIPLIER` | `2.0`         |
//! | `POSTSTATS_RETRY_JITTER`     | `true`                |
//! | `POSTSTATS_QUERY_TIMEOUT_MS` | `3000`                |
//! | `SHUTDOWN_TIMEOUT_SECS`      | `30`                  |
//!
//! Invalid values fail startup. The `memory` log source has no publisher of
//! its own and is only accepted by [`crate::run_with_log`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use poststats_ingest::IngestConfig;
use poststats_query::DEFAULT_QUERY_TIMEOUT;

use crate::error::{Result, ServerError};

/// Aggregation store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite { path: String },
    Postgres { url: String },
}

/// Where stat events are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// In-process log; events are appended by code running in the same process.
    Memory,
    /// One partition of a Kafka topic (`kafka` feature).
    Kafka { brokers: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub grpc_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub store: StoreBackend,
    pub log_source: LogSource,
    pub ingest: IngestConfig,
    pub query_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let grpc_addr = parse(&var("POSTSTATS_GRPC_ADDR", "0.0.0.0:50051"), "POSTSTATS_GRPC_ADDR")?;
        let http_addr = parse(&var("POSTSTATS_HTTP_ADDR", "0.0.0.0:8001"), "POSTSTATS_HTTP_ADDR")?;

        let store = match var("POSTSTATS_STORE", "sqlite").to_ascii_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "sqlite" => StoreBackend::Sqlite {
                path: var("POSTSTATS_SQLITE_PATH", "./data/poststats.db"),
            },
            "postgres" => {
                let url = lookup("POSTSTATS_DATABASE_URL").ok_or_else(|| {
                    ServerError::Config(
                        "POSTSTATS_DATABASE_URL is required when POSTSTATS_STORE=postgres"
                            .to_string(),
                    )
                })?;
                StoreBackend::Postgres { url }
            }
            other => {
                return Err(ServerError::Config(format!(
                    "unknown POSTSTATS_STORE '{}' (expected memory, sqlite or postgres)",
                    other
                )))
            }
        };

        let log_source = match var("POSTSTATS_LOG_SOURCE", "kafka")
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => LogSource::Memory,
            "kafka" => LogSource::Kafka {
                brokers: var("POSTSTATS_KAFKA_BROKERS", "kafka:9092"),
            },
            other => {
                return Err(ServerError::Config(format!(
                    "unknown POSTSTATS_LOG_SOURCE '{}' (expected memory or kafka)",
                    other
                )))
            }
        };

        let mut ingest_map = HashMap::new();
        for (env_key, config_key) in [
            ("POSTSTATS_TOPIC", "topic"),
            ("POSTSTATS_PARTITION", "partition"),
            ("POSTSTATS_MAX_POLL_RECORDS", "max.poll.records"),
            ("POSTSTATS_POLL_INTERVAL_MS", "poll.interval.ms"),
            ("POSTSTATS_RETRY_INITIAL_BACKOFF_MS", "retry.initial.backoff.ms"),
            ("POSTSTATS_RETRY_MAX_BACKOFF_MS", "retry.max.backoff.ms"),
            ("POSTSTATS_RETRY_BACKOFF_MULTIPLIER", "retry.backoff.multiplier"),
            ("POSTSTATS_RETRY_JITTER", "retry.jitter"),
        ] {
            if let Some(value) = lookup(env_key) {
                ingest_map.insert(config_key.to_string(), value);
            }
        }
        let ingest = IngestConfig::from_config_map(&ingest_map)
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let query_timeout = match lookup("POSTSTATS_QUERY_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(parse::<u64>(&ms, "POSTSTATS_QUERY_TIMEOUT_MS")?),
            None => DEFAULT_QUERY_TIMEOUT,
        };
        if query_timeout.is_zero() {
            return Err(ServerError::Config(
                "POSTSTATS_QUERY_TIMEOUT_MS must be > 0".to_string(),
            ));
        }

        let shutdown_timeout =
            Duration::from_secs(parse(&var("SHUTDOWN_TIMEOUT_SECS", "30"), "SHUTDOWN_TIMEOUT_SECS")?);

        Ok(Self {
            grpc_addr,
            http_addr,
            store,
            log_source,
            ingest,
            query_timeout,
            shutdown_timeout,
        })
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ServerError::Config(format!("invalid {} '{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.grpc_addr, "0.0.0.0:50051".parse().unwrap());
        assert_eq!(config.http_addr, "0.0.0.0:8001".parse().unwrap());
        assert_eq!(
            config.store,
            StoreBackend::Sqlite {
                path: "./data/poststats.db".to_string()
            }
        );
        assert_eq!(
            config.log_source,
            LogSource::Kafka {
                brokers: "kafka:9092".to_string()
            }
        );
        assert_eq!(config.ingest, IngestConfig::default());
        assert_eq!(config.query_timeout, Duration::from_millis(3000));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("POSTSTATS_GRPC_ADDR", "127.0.0.1:6000"),
            ("POSTSTATS_STORE", "Memory"),
            ("POSTSTATS_LOG_SOURCE", "kafka"),
            ("POSTSTATS_KAFKA_BROKERS", "b1:9092"),
            ("POSTSTATS_TOPIC", "OtherStats"),
            ("POSTSTATS_MAX_POLL_RECORDS", "50"),
            ("POSTSTATS_QUERY_TIMEOUT_MS", "750"),
        ])
        .unwrap();

        assert_eq!(config.grpc_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(
            config.log_source,
            LogSource::Kafka {
                brokers: "b1:9092".to_string()
            }
        );
        assert_eq!(config.ingest.topic, "OtherStats");
        assert_eq!(config.ingest.max_poll_records, 50);
        assert_eq!(config.query_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_memory_log_source() {
        let config = config_from(&[("POSTSTATS_LOG_SOURCE", "MEMORY")]).unwrap();
        assert_eq!(config.log_source, LogSource::Memory);
    }

    #[test]
    fn test_retry_policy_from_env() {
        let config = config_from(&[
            ("POSTSTATS_RETRY_INITIAL_BACKOFF_MS", "20"),
            ("POSTSTATS_RETRY_MAX_BACKOFF_MS", "2000"),
            ("POSTSTATS_RETRY_BACKOFF_MULTIPLIER", "1.5"),
            ("POSTSTATS_RETRY_JITTER", "false"),
        ])
        .unwrap();

        assert_eq!(config.ingest.retry.initial_backoff, Duration::from_millis(20));
        assert_eq!(config.ingest.retry.max_backoff, Duration::from_secs(2));
        assert_eq!(config.ingest.retry.backoff_multiplier, 1.5);
        assert!(!config.ingest.retry.jitter);
    }

    #[test]
    fn test_postgres_requires_url() {
        let err = config_from(&[("POSTSTATS_STORE", "postgres")]).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));

        let config = config_from(&[
            ("POSTSTATS_STORE", "postgres"),
            ("POSTSTATS_DATABASE_URL", "postgres://localhost/poststats"),
        ])
        .unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Postgres {
                url: "postgres://localhost/poststats".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_values_fail() {
        for pairs in [
            &[("POSTSTATS_GRPC_ADDR", "not-an-addr")][..],
            &[("POSTSTATS_STORE", "redis")][..],
            &[("POSTSTATS_LOG_SOURCE", "file")][..],
            &[("POSTSTATS_PARTITION", "-1")][..],
            &[("POSTSTATS_QUERY_TIMEOUT_MS", "0")][..],
            &[("POSTSTATS_RETRY_BACKOFF_MULTIPLIER", "0.5")][..],
            &[("POSTSTATS_RETRY_JITTER", "maybe")][..],
            &[("SHUTDOWN_TIMEOUT_SECS", "soon")][..],
        ] {
            assert!(
                matches!(config_from(pairs), Err(ServerError::Config(_))),
                "expected config error for {:?}",
                pairs
            );
        }
    }
}
