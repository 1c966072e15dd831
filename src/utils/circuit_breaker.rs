use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the notification producer. After `failure_threshold` consecutive
// failures calls fail fast for `open_for`; the next call afterwards is a
// trial, and `success_threshold` successful trials close the circuit again.
//
//   Closed --failures--> Open --open_for elapsed--> HalfOpen --successes--> Closed
//                          ^                            |
//                          +-------- any failure -------+
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Value exported on the `circuit_breaker_state` gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_for: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_for: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("{0} circuit is open")]
    CircuitOpen(&'static str),

    #[error("{0}")]
    OperationFailed(E),
}

#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    consecutive_failures: u32,
    trial_successes: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            trial_successes: 0,
            opened_at: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.trial_successes = 0;
    }

    /// Whether a call may go through, moving Open to HalfOpen once the wait is over
    fn admit(&mut self, open_for: Duration) -> bool {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened_at)) if opened_at.elapsed() >= open_for => {
                self.state = CircuitState::HalfOpen;
                self.trial_successes = 0;
                true
            }
            (CircuitState::Open, _) => false,
            _ => true,
        }
    }

    fn succeeded(&mut self, config: &CircuitBreakerConfig) -> Option<CircuitState> {
        self.consecutive_failures = 0;
        if self.state != CircuitState::HalfOpen {
            return None;
        }

        self.trial_successes += 1;
        if self.trial_successes < config.success_threshold {
            return None;
        }
        *self = Self::closed();
        Some(CircuitState::Closed)
    }

    fn failed(&mut self, config: &CircuitBreakerConfig) -> Option<CircuitState> {
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::HalfOpen => {
                self.open();
                Some(CircuitState::Open)
            }
            CircuitState::Closed if self.consecutive_failures >= config.failure_threshold => {
                self.open();
                Some(CircuitState::Open)
            }
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Breaker>>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Arc::new(Mutex::new(Breaker::closed())),
        }
    }

    /// Await `operation` unless the circuit is open
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        {
            let mut breaker = self.inner.lock().await;
            let was = breaker.state;
            if !breaker.admit(self.config.open_for) {
                return Err(CircuitBreakerError::CircuitOpen(self.name));
            }
            if was != breaker.state {
                tracing::info!(circuit = self.name, "Circuit half-open, letting a trial call through");
            }
        }

        let result = operation.await;

        let mut breaker = self.inner.lock().await;
        let transition = match &result {
            Ok(_) => breaker.succeeded(&self.config),
            Err(_) => breaker.failed(&self.config),
        };
        match transition {
            Some(CircuitState::Open) => tracing::warn!(
                circuit = self.name,
                failures = breaker.consecutive_failures,
                "⚡ Circuit opened"
            ),
            Some(CircuitState::Closed) => tracing::info!(circuit = self.name, "Circuit closed"),
            _ => {}
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, open_for_ms: u64, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                open_for: Duration::from_millis(open_for_ms),
                success_threshold,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb.call(async { Err::<(), _>("broker down") }).await;
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, 1_000, 2);
        for _ in 0..3 {
            fail(&cb).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen("test"))));
    }

    #[tokio::test]
    async fn test_trial_success_closes() {
        let cb = breaker(2, 50, 1);
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens() {
        let cb = breaker(1, 50, 2);
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        fail(&cb).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(CircuitState::Open.as_gauge(), 1);
    }

    #[tokio::test]
    async fn test_success_breaks_failure_streak() {
        let cb = breaker(2, 1_000, 1);
        fail(&cb).await;
        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        fail(&cb).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
