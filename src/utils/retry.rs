use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Retry with exponential backoff
// ============================================================================
//
// Side effects that happen after an order commit (notifications, cart
// clearing, dead letter persistence) cannot roll the order back, so they are
// retried here and handed to the dead letter queue by the caller when every
// attempt failed.
//
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Attempts in total, the first call included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Background work nobody waits on
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Work done while an HTTP request is still open
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Pause after failed attempt `attempt` (1-based), capped at `max_delay`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(scaled.max(0.0) as u64)
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Last error seen once `attempts` calls all failed
    Failed { error: E, attempts: u32 },
}

/// Run `attempt` until it succeeds or `config.max_attempts` is reached.
/// `operation` names the side effect in logs.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: &str,
    config: &RetryConfig,
    mut attempt: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        let error = match attempt().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(operation, attempts, "🔁 Succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) => error,
        };

        if attempts >= max_attempts {
            tracing::error!(operation, attempts, error = %error, "Giving up after all retries");
            return RetryResult::Failed { error, attempts };
        }

        let delay = config.delay_after(attempts);
        tracing::warn!(
            operation,
            attempts,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed, backing off"
        );
        sleep(delay).await;
    }
}
