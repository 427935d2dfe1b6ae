//! Retry with exponential backoff and jitter
//!
//! Used by the dispatcher for transport-retryable failures on idempotent
//! calls. Callers decide which errors are worth another attempt.

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::with_max_attempts(1)
    }
}

/// Largest fraction a delay is stretched or shortened by
pub const JITTER: f64 = 0.1;

/// Scale a delay by a random factor within `1 ± JITTER`
pub fn jittered(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range((1.0 - JITTER)..=(1.0 + JITTER));
    Duration::from_secs_f64(delay.as_secs_f64() * jitter)
}

/// Next delay in an exponential sequence, capped
pub fn next_delay(delay: Duration, multiplier: f64, max: Duration) -> Duration {
    Duration::from_secs_f64((delay.as_secs_f64() * multiplier).min(max.as_secs_f64()))
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or `max_attempts` is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let jittered_delay = jittered(delay);
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;
                delay = next_delay(delay, config.backoff_multiplier, config.max_delay);
            }
        }
    }
}
