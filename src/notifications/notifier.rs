use async_trait::async_trait;
use std::sync::Arc;

use crate::actors::HealthStatus;
use crate::messaging::RedpandaClient;
use crate::utils::CircuitState;
use super::Notification;

/// Delivery backend for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;

    async fn health(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    fn name(&self) -> &'static str;
}

/// Writes notifications to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "🔔 {}",
            notification.message
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Publishes notifications as JSON to a Redpanda topic, keyed by user id
pub struct RedpandaNotifier {
    client: Arc<RedpandaClient>,
    topic: String,
}

impl RedpandaNotifier {
    pub fn new(client: Arc<RedpandaClient>, topic: impl Into<String>) -> Self {
        Self { client, topic: topic.into() }
    }
}

#[async_trait]
impl Notifier for RedpandaNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let payload = serde_json::to_string(notification)?;
        self.client
            .publish(&self.topic, &notification.user_id.to_string(), &payload)
            .await
    }

    async fn health(&self) -> HealthStatus {
        match self.client.circuit_state().await {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
        }
    }

    fn name(&self) -> &'static str {
        "redpanda"
    }
}
