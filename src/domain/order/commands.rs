use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::Caller;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// Placement goes through `OrderAggregate::place`; these commands act on an
// existing order. Every command carries the caller and the instant it was
// issued so that handling stays deterministic.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    AcceptLot {
        caller: Caller,
        at: DateTime<Utc>,
    },
    StartDirectDelivery {
        caller: Caller,
        at: DateTime<Utc>,
    },
    MarkDepotDropOff {
        caller: Caller,
        at: DateTime<Utc>,
    },
    ConfirmDepotReceipt {
        caller: Caller,
        vendor_id: Uuid,
        at: DateTime<Utc>,
    },
    ConfirmReceipt {
        caller: Caller,
        at: DateTime<Utc>,
    },
    /// Scope follows the caller's role: order for clients and admins, lot for vendors
    Cancel {
        caller: Caller,
        reason: String,
        at: DateTime<Utc>,
    },
    CancelItem {
        caller: Caller,
        vendor_id: Uuid,
        product_id: Uuid,
        variation_id: Option<Uuid>,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl OrderCommand {
    pub fn caller(&self) -> &Caller {
        match self {
            OrderCommand::AcceptLot { caller, .. }
            | OrderCommand::StartDirectDelivery { caller, .. }
            | OrderCommand::MarkDepotDropOff { caller, .. }
            | OrderCommand::ConfirmDepotReceipt { caller, .. }
            | OrderCommand::ConfirmReceipt { caller, .. }
            | OrderCommand::Cancel { caller, .. }
            | OrderCommand::CancelItem { caller, .. } => caller,
        }
    }

    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::AcceptLot { .. } => "accept_lot",
            OrderCommand::StartDirectDelivery { .. } => "start_direct_delivery",
            OrderCommand::MarkDepotDropOff { .. } => "mark_depot_drop_off",
            OrderCommand::ConfirmDepotReceipt { .. } => "confirm_depot_receipt",
            OrderCommand::ConfirmReceipt { .. } => "confirm_receipt",
            OrderCommand::Cancel { .. } => "cancel",
            OrderCommand::CancelItem { .. } => "cancel_item",
        }
    }
}
