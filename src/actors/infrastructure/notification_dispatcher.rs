use async_trait::async_trait;
use chrono::Utc;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::dlq::{AddToDlq, DeadLetterKind, DeadLetterSink};
use crate::collaborators::UserDirectory;
use crate::domain::order::{OrderAggregate, OrderEvent};
use crate::event_sourcing::DomainEvent;
use crate::metrics::Metrics;
use crate::notifications::{
    plan_notifications, Audience, CommittedEvents, Notification, Notifier, OrderEventSink,
};
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Notification Dispatcher Actor
// ============================================================================
//
// Turns committed order events into per-user notifications:
// 1. plan who hears about each event
// 2. resolve audiences to user ids through the user directory
// 3. deliver through the configured Notifier, retrying with backoff
// 4. dead-letter what still fails
//
// The order write path only enqueues; delivery never blocks or fails it.
//
// ============================================================================

pub struct DispatchOrderEvents(pub CommittedEvents);

pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    users: Arc<dyn UserDirectory>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    retry_config: RetryConfig,
    metrics: Arc<Metrics>,
}

impl NotificationDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        users: Arc<dyn UserDirectory>,
        dead_letters: Option<Arc<dyn DeadLetterSink>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            notifier,
            users,
            dead_letters,
            retry_config: RetryConfig::default(),
            metrics,
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    async fn resolve(&self, order: &OrderAggregate, audience: Audience) -> Vec<Uuid> {
        let resolved = match audience {
            Audience::Client => Ok(vec![order.client_id]),
            Audience::VendorStaff(vendor_id) => self.users.vendor_staff(vendor_id).await,
            Audience::InvolvedVendors => {
                let mut vendors: Vec<Uuid> = order
                    .lots
                    .iter()
                    .filter(|lot| !lot.is_cancelled())
                    .map(|lot| lot.vendor_id)
                    .collect();
                if vendors.is_empty() {
                    vendors = order.vendor_ids();
                }

                let mut staff = Vec::new();
                for vendor_id in vendors {
                    match self.users.vendor_staff(vendor_id).await {
                        Ok(ids) => staff.extend(ids),
                        Err(e) => {
                            tracing::warn!(vendor_id = %vendor_id, error = %e, "Failed to resolve vendor staff");
                        }
                    }
                }
                Ok(staff)
            }
            Audience::Admins => self.users.admins().await,
        };

        match resolved {
            Ok(ids) => ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect(),
            Err(e) => {
                tracing::warn!(order_id = %order.id, audience = ?audience, error = %e, "Failed to resolve audience");
                Vec::new()
            }
        }
    }

    async fn deliver(&self, order_id: Uuid, notification: Notification) {
        let notifier = self.notifier.clone();
        let result = retry_with_backoff("notify", &self.retry_config, || {
            let notifier = notifier.clone();
            let notification = notification.clone();
            async move { notifier.notify(&notification).await }
        })
        .await;

        match result {
            RetryResult::Success(()) => {
                self.metrics.record_notification(notification.kind.as_str(), true);
            }
            RetryResult::Failed { error: e, attempts } => {
                self.metrics.record_notification(notification.kind.as_str(), false);
                tracing::error!(
                    order_id = %order_id,
                    user_id = %notification.user_id,
                    kind = notification.kind.as_str(),
                    error = %e,
                    "Notification delivery failed after retries"
                );

                if let Some(sink) = &self.dead_letters {
                    let payload = serde_json::to_string(&notification).unwrap_or_default();
                    sink.dead_letter(AddToDlq {
                        kind: DeadLetterKind::Notification,
                        order_id,
                        payload,
                        error_message: e.to_string(),
                        failure_count: attempts,
                        first_failed_at: Utc::now(),
                    })
                    .await;
                }
            }
        }
    }

    async fn dispatch(&self, committed: CommittedEvents) {
        let order = &committed.order;

        for envelope in &committed.events {
            let event: &OrderEvent = &envelope.event_data;
            let planned = plan_notifications(order, event, &committed.actor);

            tracing::debug!(
                order_id = %order.id,
                event = event.event_name(),
                planned = planned.len(),
                "Dispatching notifications"
            );

            for plan in planned {
                for user_id in self.resolve(order, plan.audience).await {
                    let notification = Notification {
                        user_id,
                        kind: plan.kind,
                        title: plan.title.clone(),
                        message: plan.message.clone(),
                        data: serde_json::json!({
                            "order_id": order.id,
                            "order_number": order.order_number,
                            "event": event.event_name(),
                            "vendor_id": event.vendor_id(),
                        }),
                    };
                    self.deliver(order.id, notification).await;
                }
            }
        }
    }
}

impl Actor for NotificationDispatcher {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(
            notifier = state.notifier.name(),
            dead_letters = state.dead_letters.is_some(),
            "NotificationDispatcher started"
        );
        Ok(state)
    }
}

impl Message<DispatchOrderEvents> for NotificationDispatcher {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: DispatchOrderEvents,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.dispatch(msg.0).await;
    }
}

#[async_trait]
impl OrderEventSink for ActorRef<NotificationDispatcher> {
    async fn publish(&self, committed: CommittedEvents) {
        let order_id = committed.order.id;
        if self.tell(DispatchOrderEvents(committed)).send().await.is_err() {
            tracing::error!(order_id = %order_id, "NotificationDispatcher unavailable, notifications dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kameo::prelude::*;
    use crate::actors::infrastructure::dlq::{DlqActor, GetDlqReport};
    use crate::collaborators::InMemoryDirectory;
    use crate::domain::order::aggregate::tests::Fixture;
    use crate::domain::order::{Caller, DeliveryMode};
    use crate::event_sourcing::EventEnvelope;
    use crate::notifications::NotificationKind;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("notification backend down");
            }
            self.sent.lock().await.push(notification.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    async fn placed_committed(f: &Fixture) -> CommittedEvents {
        let order = f.order(DeliveryMode::SupermarketDelivery);
        let event = OrderEvent::Placed(f.placed(DeliveryMode::SupermarketDelivery));
        CommittedEvents {
            events: vec![EventEnvelope::new(
                order.id,
                1,
                OrderEvent::event_type().to_string(),
                event,
                Uuid::now_v7(),
            )],
            order,
            actor: f.owner(),
        }
    }

    #[tokio::test]
    async fn test_placed_order_reaches_every_party() {
        let f = Fixture::new();
        let directory = InMemoryDirectory::default();
        let staff_a = Uuid::new_v4();
        let staff_b = Uuid::new_v4();
        let admin = Uuid::new_v4();
        directory.put_staff(f.vendor_a, staff_a).await;
        directory.put_staff(f.vendor_b, staff_b).await;
        directory.put_admin(admin).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher = NotificationDispatcher::spawn(
            NotificationDispatcher::new(notifier.clone(), Arc::new(directory), None, metrics.clone())
                .with_retry_config(fast_retry()),
        );

        dispatcher.ask(DispatchOrderEvents(placed_committed(&f).await)).await.unwrap();

        let sent = notifier.sent.lock().await;
        let recipients: Vec<Uuid> = sent.iter().map(|n| n.user_id).collect();
        assert_eq!(recipients, vec![f.client, staff_a, staff_b, admin]);
        assert!(sent.iter().all(|n| n.kind == NotificationKind::OrderPlaced));
        assert_eq!(
            metrics.notifications_sent.with_label_values(&["order_placed"]).get(),
            4
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_is_dead_lettered() {
        let f = Fixture::new();
        let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
        let metrics = Arc::new(Metrics::new().unwrap());
        let dlq = DlqActor::spawn(DlqActor::new(None, 16, metrics.clone()));
        let sink: Arc<dyn DeadLetterSink> = Arc::new(dlq.clone());

        let dispatcher = NotificationDispatcher::spawn(
            NotificationDispatcher::new(notifier, Arc::new(InMemoryDirectory::default()), Some(sink), metrics.clone())
                .with_retry_config(fast_retry()),
        );

        // No staff or admins registered: only the client is resolved
        dispatcher.ask(DispatchOrderEvents(placed_committed(&f).await)).await.unwrap();

        let report = dlq.ask(GetDlqReport { limit: 10 }).await.unwrap();
        assert_eq!(report.stats.total_messages, 1);
        assert_eq!(report.recent[0].kind, DeadLetterKind::Notification);
        assert_eq!(report.recent[0].failure_count, 2);
        assert_eq!(
            metrics.notifications_failed.with_label_values(&["order_placed"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_sink_enqueues_without_waiting() {
        let f = Fixture::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher = NotificationDispatcher::spawn(NotificationDispatcher::new(
            notifier.clone(),
            Arc::new(InMemoryDirectory::default()),
            None,
            metrics,
        ));

        let mut committed = placed_committed(&f).await;
        committed.actor = Caller::admin(Uuid::new_v4());
        dispatcher.publish(committed).await;

        // A follow-up ask is processed after the enqueued dispatch
        dispatcher
            .ask(DispatchOrderEvents(CommittedEvents {
                order: f.order(DeliveryMode::Collect),
                events: Vec::new(),
                actor: f.owner(),
            }))
            .await
            .unwrap();

        assert_eq!(notifier.sent.lock().await.len(), 1);
    }
}
