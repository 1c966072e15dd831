use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use serde::Serialize;
use std::sync::Arc;
use std::collections::HashMap;
use std::time::Duration;
use chrono::Utc;
use crate::notifications::Notifier;
use crate::actors::core::{HealthStatus, ComponentHealth};
use super::dlq::{DlqActor, GetDlqReport};

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Track health status of all components
// - Poll the notification backend and the dead letter queue
// - Aggregate system-wide health for the /health endpoint
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

// Implement Reply for SystemHealth to use it as a message reply type
impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    notifier: Arc<dyn Notifier>,
    dlq: Option<ActorRef<DlqActor>>,
    interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(notifier: Arc<dyn Notifier>, dlq: Option<ActorRef<DlqActor>>, interval: Duration) -> Self {
        Self {
            components: HashMap::new(),
            notifier,
            dlq,
            interval,
        }
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Dead letters never make the service unhealthy, only degraded
fn dead_letter_status(total: u64) -> HealthStatus {
    if total == 0 {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded(format!("{} dead letters awaiting inspection", total))
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        state: Self::Args,
        actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!(interval_ms = state.interval.as_millis() as u64, "HealthMonitorActor started");

        // Clone what we need for the periodic task
        let notifier = state.notifier.clone();
        let dlq = state.dlq.clone();
        let period = state.interval;
        let actor_ref_clone = actor_ref.clone();

        // Schedule periodic health checks
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;

                let status = notifier.health().await;
                if actor_ref_clone.tell(UpdateHealth {
                    component: "notifier".to_string(),
                    status,
                    details: Some(notifier.name().to_string()),
                }).send().await.is_err() {
                    // Monitor stopped
                    break;
                }

                if let Some(ref dlq) = dlq {
                    match dlq.ask(GetDlqReport { limit: 0 }).await {
                        Ok(report) => {
                            let _ = actor_ref_clone.tell(UpdateHealth {
                                component: "dead_letters".to_string(),
                                status: dead_letter_status(report.stats.total_messages),
                                details: None,
                            }).send().await;
                        }
                        Err(_) => {
                            let _ = actor_ref_clone.tell(UpdateHealth {
                                component: "dead_letters".to_string(),
                                status: HealthStatus::Unhealthy("DlqActor not responding".to_string()),
                                details: None,
                            }).send().await;
                        }
                    }
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        tracing::debug!(
            component = %msg.component,
            status = ?msg.status,
            "Updated component health"
        );

        let health = ComponentHealth::new(msg.component.clone(), msg.status).with_details(msg.details);
        self.components.insert(msg.component, health);
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let overall_status = self.compute_overall_status();

        SystemHealth {
            overall_status,
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}
