use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka-compatible producer used by the notification backend
pub struct RedpandaClient {
    producer: FutureProducer,
    breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl RedpandaClient {
    pub fn new(brokers: &str, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "boutique-orders")
            .set("message.timeout.ms", SEND_TIMEOUT.as_millis().to_string())
            .set("acks", "all")
            .create()
            .context("Failed to create Redpanda producer")?;

        Ok(Self {
            producer,
            breaker: CircuitBreaker::new("redpanda", CircuitBreakerConfig::default()),
            metrics,
        })
    }

    /// Publish one record; fails fast while the circuit is open
    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        let outcome = self
            .breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);
                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))
            })
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.update_circuit_breaker_state(self.breaker.state().await.as_gauge());
        }

        match outcome {
            Ok(()) => {
                tracing::debug!(topic, key, "📤 Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen(name)) => {
                tracing::warn!(topic, circuit = name, "Redpanda unavailable, circuit open");
                Err(anyhow::anyhow!("{} circuit is open", name))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(topic, error = %e, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }
}
