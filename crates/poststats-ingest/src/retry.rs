//! Retry Logic with Exponential Backoff
//!
//! Store writes made by the ingestion consumer go through this module so a
//! temporarily unavailable aggregation store delays ingestion instead of
//! losing events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ append_stat_facts()  │ Ingestion Consumer
//! └──────┬───────────────┘
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  RetryPolicy                 │
//! │  - initial_backoff: 100ms    │
//! │  - max_backoff: 30s          │
//! │  - backoff_multiplier: 2.0   │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ Attempt 1: Immediate
//!        ├─→ Attempt 2: Wait 100ms
//!        ├─→ Attempt 3: Wait 200ms
//!        ├─→ Attempt 4: Wait 400ms
//!        └─→ ...        capped at 30s, until success or shutdown
//! ```
//!
//! ## Every failure is retried
//!
//! The loop does not classify errors. A fact that never reaches the store is
//! lost for good, so a full disk or a read-only database is waited out the
//! same way as a dropped connection.
//!
//! A shutdown signal interrupts the backoff sleep so a stuck store cannot
//! hold the process open.

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration for exponential backoff.
///
/// ```text
/// backoff = min(initial_backoff * multiplier^attempt, max_backoff)
/// jittered = backoff * (0.75 + random(0.0, 0.5))
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,

    /// Spread each wait by ±25% so restarted consumers don't retry in lockstep
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 100ms doubling to 30s, jittered.
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_backoff: Duration, max_backoff: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff before retry number `attempt` (0-indexed), without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        // past 2^64 the cap has long been reached
        let exponent = attempt.min(64) as i32;
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !backoff_ms.is_finite() || backoff_ms >= self.max_backoff.as_millis() as f64 {
            return self.max_backoff;
        }
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// Backoff the retry loop actually sleeps for.
    pub fn delay(&self, attempt: usize) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter {
            return base;
        }
        let factor = 0.75 + rand::random::<f64>() * 0.5; // 0.75-1.25x
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }
}

/// Shutdown arrived before [`retry_with_backoff`] got a result.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("retry abandoned on shutdown")]
pub struct Cancelled;

/// Sleep for `duration` unless shutdown is signalled first.
///
/// Returns `true` when shutdown was requested (or its sender is gone).
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = sleep(duration) => false,
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            Err(_) => true,
        },
    }
}

/// Retry an async operation with exponential backoff until it succeeds.
///
/// `operation` receives the 0-indexed attempt number. Every error is logged
/// and retried; only a shutdown signal during the backoff sleep ends the loop
/// early, with [`Cancelled`].
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut operation: F,
) -> Result<T, Cancelled>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0usize;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                let backoff = policy.delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Operation failed, backing off"
                );

                if sleep_or_shutdown(backoff, shutdown).await {
                    return Err(Cancelled);
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
