// ============================================================================
// Notifications
// ============================================================================
//
// Fire-and-forget side channel fed with committed order events.
// - planner:  pure rules deciding who hears about which event
// - notifier: delivery backends (tracing log, Redpanda topic)
//
// Delivery itself runs in the NotificationDispatcher actor.
//
// ============================================================================

mod notifier;
mod planner;

pub use notifier::{LogNotifier, Notifier, RedpandaNotifier};
pub use planner::{plan_notifications, Audience, PlannedNotification};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{Caller, OrderAggregate, OrderEvent};
use crate::event_sourcing::EventEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    LotAccepted,
    DeliveryStarted,
    DepotDropOff,
    DepotReceived,
    ReceiptConfirmed,
    OrderCancelled,
    LotCancelled,
    ItemCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::LotAccepted => "lot_accepted",
            NotificationKind::DeliveryStarted => "delivery_started",
            NotificationKind::DepotDropOff => "depot_drop_off",
            NotificationKind::DepotReceived => "depot_received",
            NotificationKind::ReceiptConfirmed => "receipt_confirmed",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::LotCancelled => "lot_cancelled",
            NotificationKind::ItemCancelled => "item_cancelled",
        }
    }
}

/// One message for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

/// Events of one successful append, with the resulting order state
#[derive(Debug, Clone)]
pub struct CommittedEvents {
    pub order: OrderAggregate,
    pub events: Vec<EventEnvelope<OrderEvent>>,
    pub actor: Caller,
}

/// Receives committed events. Must not block or fail the caller.
#[async_trait]
pub trait OrderEventSink: Send + Sync {
    async fn publish(&self, committed: CommittedEvents);
}

/// Sink that drops everything
pub struct NullSink;

#[async_trait]
impl OrderEventSink for NullSink {
    async fn publish(&self, _committed: CommittedEvents) {}
}
