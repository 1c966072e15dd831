use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::event_sourcing::DomainEvent;
use super::value_objects::{
    Cancellation, ClientContact, DeliveryFee, DeliveryMode, ReceiptKind, Validation, VendorLot,
};

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    LotAccepted(LotAccepted),
    DirectDeliveryStarted(DirectDeliveryStarted),
    DepotDropOffMarked(DepotDropOffMarked),
    DepotReceiptConfirmed(DepotReceiptConfirmed),
    ReceiptConfirmed(ReceiptConfirmed),
    OrderCancelled(OrderCancelled),
    LotCancelled(LotCancelled),
    ItemCancelled(ItemCancelled),
}

impl DomainEvent for OrderEvent {
    fn event_type() -> &'static str { "OrderEvent" }

    fn event_name(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::LotAccepted(_) => "LotAccepted",
            OrderEvent::DirectDeliveryStarted(_) => "DirectDeliveryStarted",
            OrderEvent::DepotDropOffMarked(_) => "DepotDropOffMarked",
            OrderEvent::DepotReceiptConfirmed(_) => "DepotReceiptConfirmed",
            OrderEvent::ReceiptConfirmed(_) => "ReceiptConfirmed",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::LotCancelled(_) => "LotCancelled",
            OrderEvent::ItemCancelled(_) => "ItemCancelled",
        }
    }
}

impl OrderEvent {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.placed_at,
            OrderEvent::LotAccepted(e) => e.at,
            OrderEvent::DirectDeliveryStarted(e) => e.at,
            OrderEvent::DepotDropOffMarked(e) => e.at,
            OrderEvent::DepotReceiptConfirmed(e) => e.at,
            OrderEvent::ReceiptConfirmed(e) => e.validation.at,
            OrderEvent::OrderCancelled(e) => e.cancellation.at,
            OrderEvent::LotCancelled(e) => e.cancellation.at,
            OrderEvent::ItemCancelled(e) => e.cancellation.at,
        }
    }

    /// Vendor whose lot the event is about, when it targets a single lot
    pub fn vendor_id(&self) -> Option<Uuid> {
        match self {
            OrderEvent::LotAccepted(e) => Some(e.vendor_id),
            OrderEvent::DirectDeliveryStarted(e) => Some(e.vendor_id),
            OrderEvent::DepotDropOffMarked(e) => Some(e.vendor_id),
            OrderEvent::DepotReceiptConfirmed(e) => Some(e.vendor_id),
            OrderEvent::LotCancelled(e) => Some(e.vendor_id),
            OrderEvent::ItemCancelled(e) => Some(e.vendor_id),
            OrderEvent::Placed(_) | OrderEvent::ReceiptConfirmed(_) | OrderEvent::OrderCancelled(_) => None,
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Placed - full snapshot taken from the cart at checkout
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub client: ClientContact,
    pub delivery_mode: DeliveryMode,
    pub delivery_address: String,
    pub payment_method: String,
    pub delivery_fee: DeliveryFee,
    pub requested_at: DateTime<Utc>,
    pub same_day: bool,
    pub lots: Vec<VendorLot>,
    pub note: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LotAccepted {
    pub vendor_id: Uuid,
    pub accepted_by: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DirectDeliveryStarted {
    pub vendor_id: Uuid,
    pub started_by: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DepotDropOffMarked {
    pub vendor_id: Uuid,
    pub marked_by: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DepotReceiptConfirmed {
    pub vendor_id: Uuid,
    pub admin_id: Uuid,
    pub at: DateTime<Utc>,
}

/// Receipt Confirmed - goods collected or delivered, payment settled
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReceiptConfirmed {
    pub kind: ReceiptKind,
    pub validation: Validation,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCancelled {
    pub cancellation: Cancellation,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LotCancelled {
    pub vendor_id: Uuid,
    pub cancellation: Cancellation,
}

/// Item Cancelled - one line of a lot; `item_index` is its position in the lot
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ItemCancelled {
    pub vendor_id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub item_index: usize,
    pub cancellation: Cancellation,
}
