use uuid::Uuid;

use crate::domain::order::{Caller, OrderAggregate, OrderEvent, Role};
use super::NotificationKind;

/// Who should receive a notification, before user ids are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Client,
    /// Staff of one vendor
    VendorStaff(Uuid),
    /// Staff of every vendor with a non-cancelled lot (all lots when none remain)
    InvolvedVendors,
    Admins,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNotification {
    pub audience: Audience,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

fn planned(audience: Audience, kind: NotificationKind, title: &str, message: String) -> PlannedNotification {
    PlannedNotification { audience, kind, title: title.to_string(), message }
}

fn lot_name(order: &OrderAggregate, vendor_id: Uuid) -> String {
    order
        .lot(vendor_id)
        .map(|lot| lot.vendor_name.clone())
        .unwrap_or_else(|| vendor_id.to_string())
}

/// Notifications owed for `event`, which `actor` caused on `order`.
///
/// Vendor and admin actions are reported to the client; client and validator
/// actions to the admins and the vendors concerned.
pub fn plan_notifications(order: &OrderAggregate, event: &OrderEvent, actor: &Caller) -> Vec<PlannedNotification> {
    let number = &order.order_number;

    match event {
        OrderEvent::Placed(_) => {
            let mut plan = vec![planned(
                Audience::Client,
                NotificationKind::OrderPlaced,
                "Order received",
                format!("Your order {} was received, total {}", number, order.total),
            )];
            for lot in &order.lots {
                plan.push(planned(
                    Audience::VendorStaff(lot.vendor_id),
                    NotificationKind::OrderPlaced,
                    "New order",
                    format!("Order {} contains {} item(s) for {}", number, lot.items.len(), lot.vendor_name),
                ));
            }
            plan.push(planned(
                Audience::Admins,
                NotificationKind::OrderPlaced,
                "New order",
                format!("Order {} was placed ({})", number, order.delivery_mode),
            ));
            plan
        }
        OrderEvent::LotAccepted(e) => vec![planned(
            Audience::Client,
            NotificationKind::LotAccepted,
            "Order accepted",
            format!("{} accepted its part of order {}", lot_name(order, e.vendor_id), number),
        )],
        OrderEvent::DirectDeliveryStarted(e) => vec![planned(
            Audience::Client,
            NotificationKind::DeliveryStarted,
            "On its way",
            format!("{} is delivering order {}", lot_name(order, e.vendor_id), number),
        )],
        OrderEvent::DepotDropOffMarked(e) => vec![
            planned(
                Audience::Client,
                NotificationKind::DepotDropOff,
                "Dropped at depot",
                format!("{} dropped its part of order {} at the depot", lot_name(order, e.vendor_id), number),
            ),
            planned(
                Audience::Admins,
                NotificationKind::DepotDropOff,
                "Depot drop-off to confirm",
                format!("{} dropped off order {}", lot_name(order, e.vendor_id), number),
            ),
        ],
        OrderEvent::DepotReceiptConfirmed(e) => vec![
            planned(
                Audience::Client,
                NotificationKind::DepotReceived,
                "Received at depot",
                format!("Goods from {} for order {} reached the depot", lot_name(order, e.vendor_id), number),
            ),
            planned(
                Audience::VendorStaff(e.vendor_id),
                NotificationKind::DepotReceived,
                "Depot receipt confirmed",
                format!("The depot confirmed your drop-off for order {}", number),
            ),
        ],
        OrderEvent::ReceiptConfirmed(_) => {
            let mut plan = vec![planned(
                Audience::InvolvedVendors,
                NotificationKind::ReceiptConfirmed,
                "Order completed",
                format!("Order {} was handed over to the client", number),
            )];
            match actor.role {
                Role::Admin => plan.push(planned(
                    Audience::Client,
                    NotificationKind::ReceiptConfirmed,
                    "Order completed",
                    format!("Receipt of order {} was confirmed", number),
                )),
                _ => plan.push(planned(
                    Audience::Admins,
                    NotificationKind::ReceiptConfirmed,
                    "Order completed",
                    format!("Receipt of order {} was confirmed by the {}", number, actor.role),
                )),
            }
            plan
        }
        OrderEvent::OrderCancelled(e) => {
            let reason = &e.cancellation.reason;
            let mut plan = vec![planned(
                Audience::InvolvedVendors,
                NotificationKind::OrderCancelled,
                "Order cancelled",
                format!("Order {} was cancelled by the {}: {}", number, actor.role, reason),
            )];
            match actor.role {
                Role::Client => plan.push(planned(
                    Audience::Admins,
                    NotificationKind::OrderCancelled,
                    "Order cancelled",
                    format!("The client cancelled order {}: {}", number, reason),
                )),
                _ => plan.push(planned(
                    Audience::Client,
                    NotificationKind::OrderCancelled,
                    "Order cancelled",
                    format!("Your order {} was cancelled: {}", number, reason),
                )),
            }
            plan
        }
        OrderEvent::LotCancelled(e) => vec![planned(
            Audience::Client,
            NotificationKind::LotCancelled,
            "Part of your order cancelled",
            format!(
                "{} cancelled its part of order {}: {}",
                lot_name(order, e.vendor_id),
                number,
                e.cancellation.reason
            ),
        )],
        OrderEvent::ItemCancelled(e) => {
            let audience = match actor.role {
                Role::Client => Audience::VendorStaff(e.vendor_id),
                _ => Audience::Client,
            };
            let product = order
                .lot(e.vendor_id)
                .and_then(|lot| lot.items.get(e.item_index))
                .map(|item| item.product_name.clone())
                .unwrap_or_else(|| e.product_id.to_string());
            vec![planned(
                audience,
                NotificationKind::ItemCancelled,
                "Item cancelled",
                format!("{} was removed from order {}: {}", product, number, e.cancellation.reason),
            )]
        }
    }
}
