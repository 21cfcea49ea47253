//! Ingestion consumer configuration.
//!
//! ## Configuration
//!
//! | Key                          | Description                               | Default      |
//! |------------------------------|-------------------------------------------|--------------|
//! | `topic`                      | Topic carrying stat events                | `StatsTopic` |
//! | `partition`                  | Partition this consumer owns              | `0`          |
//! | `max.poll.records`           | Maximum records per batch                 | `500`        |
//! | `poll.interval.ms`           | Sleep when the log has nothing new        | `100`        |
//! | `retry.initial.backoff.ms`   | First retry delay                         | `100`        |
//! | `retry.max.backoff.ms`       | Retry delay cap                           | `30000`      |
//! | `retry.backoff.multiplier`   | Growth factor between retries             | `2.0`        |
//! | `retry.jitter`               | Randomise retry delays by ±25%            | `true`       |
//!
//! Store writes are retried without limit; there is no retry count to set.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_TOPIC: &str = "StatsTopic";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub topic: String,
    pub partition: u32,
    pub max_poll_records: usize,
    pub poll_interval: Duration,
    /// Applied to store writes and to reader poll failures.
    pub retry: RetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            partition: 0,
            max_poll_records: 500,
            poll_interval: Duration::from_millis(100),
            retry: RetryPolicy::default(),
        }
    }
}

fn parse_key<T>(config: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    config
        .get(key)
        .map(|s| {
            s.trim()
                .parse::<T>()
                .map_err(|e| IngestError::Config(format!("invalid {}: {}", key, e)))
        })
        .transpose()
}

impl IngestConfig {
    /// Parse an `IngestConfig` from a string key-value map.
    ///
    /// Every key is optional; missing keys take the defaults above.
    pub fn from_config_map(config: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        let topic = config
            .get("topic")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.topic);
        if topic.is_empty() {
            return Err(IngestError::Config("'topic' must not be empty".to_string()));
        }

        let partition = parse_key::<u32>(config, "partition")?.unwrap_or(defaults.partition);

        let max_poll_records =
            parse_key::<usize>(config, "max.poll.records")?.unwrap_or(defaults.max_poll_records);
        if max_poll_records == 0 {
            return Err(IngestError::Config(
                "'max.poll.records' must be greater than 0".to_string(),
            ));
        }

        let poll_interval = parse_key::<u64>(config, "poll.interval.ms")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let retry = Self::retry_from_config_map(config, defaults.retry)?;

        Ok(Self {
            topic,
            partition,
            max_poll_records,
            poll_interval,
            retry,
        })
    }

    fn retry_from_config_map(
        config: &HashMap<String, String>,
        defaults: RetryPolicy,
    ) -> Result<RetryPolicy> {
        let initial_backoff = parse_key::<u64>(config, "retry.initial.backoff.ms")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);
        let max_backoff = parse_key::<u64>(config, "retry.max.backoff.ms")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_backoff);
        let backoff_multiplier = parse_key::<f64>(config, "retry.backoff.multiplier")?
            .unwrap_or(defaults.backoff_multiplier);
        let jitter = parse_key::<bool>(config, "retry.jitter")?.unwrap_or(defaults.jitter);

        if !(backoff_multiplier >= 1.0 && backoff_multiplier.is_finite()) {
            return Err(IngestError::Config(format!(
                "'retry.backoff.multiplier' must be >= 1.0, got {}",
                backoff_multiplier
            )));
        }
        if initial_backoff > max_backoff {
            return Err(IngestError::Config(format!(
                "'retry.initial.backoff.ms' ({}) exceeds 'retry.max.backoff.ms' ({})",
                initial_backoff.as_millis(),
                max_backoff.as_millis()
            )));
        }

        Ok(RetryPolicy::new(initial_backoff, max_backoff, backoff_multiplier).with_jitter(jitter))
    }
}
