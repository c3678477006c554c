//! Bounded retry with exponential backoff for collaborator calls.
//!
//! A timed-out call counts as a transient failure. The timeout itself is
//! applied by the [`Dispatcher`](super::Dispatcher) around the outbound call
//! only, never around the wait for a permit or rate slot. Non-transient
//! failures are returned after the first attempt.
//! Sleeping goes through the [`Sleeper`] trait so tests can observe the
//! backoff schedule without waiting.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::error::ServiceError;

/// Suspends the current task for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry policy: at most `max_attempts` calls, waiting
/// `base_delay * 2^(retry-1)` (capped at `max_delay`) between them, scaled
/// up by a random factor in `[1, 1 + jitter]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    pub jitter: f64,
    #[serde(with = "millis")]
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.2,
            call_timeout: Duration::from_secs(15),
        }
    }
}

/// All attempts failed (or the first failure was not retryable).
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: ServiceError,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), given a jitter sample
    /// in `[0, 1]`.
    pub fn backoff(&self, retry: u32, jitter_sample: f64) -> Duration {
        let exp = retry.saturating_sub(1).min(30);
        let base = self.base_delay.saturating_mul(1u32 << exp);
        let capped = base.min(self.max_delay);
        let factor = 1.0 + self.jitter.max(0.0) * jitter_sample.clamp(0.0, 1.0);
        capped.mul_f64(factor)
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt budget
    /// is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut, S>(&self, sleeper: &S, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
        S: Sleeper + ?Sized,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let sample = if self.jitter > 0.0 {
                        rand::thread_rng().gen_range(0.0..=1.0)
                    } else {
                        0.0
                    };
                    let delay = self.backoff(attempt, sample);
                    warn!(attempt, max_attempts, ?delay, error = %e, "Transient failure, retrying");
                    sleeper.sleep(delay).await;
                }
                Err(e) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
