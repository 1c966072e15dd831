use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Role of the party acting on an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Vendor,
    Admin,
    Validator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
            Role::Validator => "validator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            "validator" => Ok(Role::Validator),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Authenticated party issuing a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
    /// Vendor the staff member works for; set only for `Role::Vendor`
    pub vendor_id: Option<Uuid>,
}

impl Caller {
    pub fn client(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Client, vendor_id: None }
    }

    pub fn vendor(user_id: Uuid, vendor_id: Uuid) -> Self {
        Self { user_id, role: Role::Vendor, vendor_id: Some(vendor_id) }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Admin, vendor_id: None }
    }

    pub fn validator(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Validator, vendor_id: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    SupermarketDelivery,
    VendorDelivery,
    #[serde(alias = "pickup")]
    Collect,
    VendorDirect,
}

impl DeliveryMode {
    /// Every mode except vendor-direct hands lots over at the depot
    pub fn routes_through_depot(&self) -> bool {
        !matches!(self, DeliveryMode::VendorDirect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::SupermarketDelivery => "supermarket_delivery",
            DeliveryMode::VendorDelivery => "vendor_delivery",
            DeliveryMode::Collect => "collect",
            DeliveryMode::VendorDirect => "vendor_direct",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "supermarket_delivery" => Ok(DeliveryMode::SupermarketDelivery),
            "vendor_delivery" => Ok(DeliveryMode::VendorDelivery),
            "collect" | "pickup" => Ok(DeliveryMode::Collect),
            "vendor_direct" => Ok(DeliveryMode::VendorDirect),
            other => Err(format!("unknown delivery mode: {}", other)),
        }
    }
}

/// Top-level delivery status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    AwaitingVendorAcceptance,
    Preparing,
    ReadyForPickup,
    InDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::AwaitingVendorAcceptance => "awaiting_vendor_acceptance",
            OrderStatus::Preparing => "preparing",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::InDelivery => "in_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    AwaitingVendorAcceptance,
    Preparing,
    ReadyForPickup,
    InDelivery,
    Delivered,
    Cancelled,
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LotStatus::AwaitingVendorAcceptance => "awaiting_vendor_acceptance",
            LotStatus::Preparing => "preparing",
            LotStatus::ReadyForPickup => "ready_for_pickup",
            LotStatus::InDelivery => "in_delivery",
            LotStatus::Delivered => "delivered",
            LotStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

/// Payment intent recorded on the order. No gateway is involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub method: String,
    pub status: PaymentStatus,
    pub paid_amount: Decimal,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn unpaid(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            status: PaymentStatus::Unpaid,
            paid_amount: Decimal::ZERO,
            transaction_id: None,
            paid_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    Fixed,
    Percentage,
}

/// Delivery fee together with the rule that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryFee {
    #[serde(rename = "type")]
    pub kind: FeeKind,
    pub value: Decimal,
    pub amount: Decimal,
}

impl DeliveryFee {
    pub fn zero() -> Self {
        Self { kind: FeeKind::Fixed, value: Decimal::ZERO, amount: Decimal::ZERO }
    }
}

/// Entry of a vendor or platform fee schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRule {
    pub id: Uuid,
    /// `None` for the platform-wide rule
    pub vendor_id: Option<Uuid>,
    pub kind: FeeKind,
    pub value: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Client contact captured when the order is placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientContact {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepotHandOff {
    pub done: bool,
    pub dropped_off_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl DepotHandOff {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

/// Line of a vendor lot; name, image and price are snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub price_record_id: Option<Uuid>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub product_name: String,
    pub image: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub promotion_id: Option<Uuid>,
    pub status: ItemStatus,
}

impl OrderItem {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }
}

/// Portion of an order belonging to one vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorLot {
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub depot: DepotHandOff,
    pub status: LotStatus,
    pub items: Vec<OrderItem>,
}

impl VendorLot {
    pub fn is_cancelled(&self) -> bool {
        self.status == LotStatus::Cancelled
    }

    pub fn has_active_items(&self) -> bool {
        self.items.iter().any(OrderItem::is_active)
    }

    pub fn active_subtotal(&self) -> Decimal {
        self.items
            .iter()
            .filter(|item| item.is_active())
            .map(OrderItem::subtotal)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Collected,
    Delivered,
}

/// Terminal confirmation of collection or delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub validated_by: Uuid,
    pub role: Role,
    pub at: DateTime<Utc>,
}

/// Who cancelled, why and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub by: Uuid,
    pub role: Role,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl Cancellation {
    pub fn note_line(&self, scope: &str) -> String {
        format!(
            "[{}] {} cancelled by {}: {}",
            self.at.format("%Y-%m-%d %H:%M"),
            scope,
            self.role,
            self.reason
        )
    }
}

/// Monetary fields derived from the active items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub base_total: Decimal,
    pub delivery_fee: DeliveryFee,
    pub total: Decimal,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roles_and_modes() {
        assert_eq!("Vendor".parse::<Role>().unwrap(), Role::Vendor);
        assert!("courier".parse::<Role>().is_err());
        assert_eq!("pickup".parse::<DeliveryMode>().unwrap(), DeliveryMode::Collect);
        assert_eq!("vendor_direct".parse::<DeliveryMode>().unwrap(), DeliveryMode::VendorDirect);
        assert!("drone".parse::<DeliveryMode>().is_err());
    }

    fn item(unit_price: i64, quantity: u32, status: ItemStatus) -> OrderItem {
        OrderItem {
            product_id: Uuid::new_v4(),
            variation_id: None,
            vendor_id: Uuid::new_v4(),
            price_record_id: None,
            quantity,
            unit_price: Decimal::from(unit_price),
            product_name: "Vanilla pods".to_string(),
            image: None,
            coupon_id: None,
            promotion_id: None,
            status,
        }
    }

    #[test]
    fn test_item_subtotal() {
        assert_eq!(item(1000, 2, ItemStatus::Active).subtotal(), Decimal::from(2000));
    }

    #[test]
    fn test_lot_active_subtotal_skips_cancelled_items() {
        let lot = VendorLot {
            vendor_id: Uuid::new_v4(),
            vendor_name: "Boutique A".to_string(),
            accepted: false,
            accepted_at: None,
            depot: DepotHandOff::default(),
            status: LotStatus::AwaitingVendorAcceptance,
            items: vec![item(1000, 2, ItemStatus::Active), item(700, 1, ItemStatus::Cancelled)],
        };

        assert_eq!(lot.active_subtotal(), Decimal::from(2000));
        assert!(lot.has_active_items());
    }

    #[test]
    fn test_only_vendor_direct_skips_depot() {
        assert!(DeliveryMode::SupermarketDelivery.routes_through_depot());
        assert!(DeliveryMode::VendorDelivery.routes_through_depot());
        assert!(DeliveryMode::Collect.routes_through_depot());
        assert!(!DeliveryMode::VendorDirect.routes_through_depot());
    }

    #[test]
    fn test_delivery_mode_wire_names() {
        let mode: DeliveryMode = serde_json::from_str("\"pickup\"").unwrap();
        assert_eq!(mode, DeliveryMode::Collect);
        assert_eq!(serde_json::to_string(&DeliveryMode::VendorDirect).unwrap(), "\"vendor_direct\"");
    }

    #[test]
    fn test_delivery_fee_serializes_kind_as_type() {
        let fee = DeliveryFee { kind: FeeKind::Percentage, value: Decimal::from(10), amount: Decimal::from(250) };
        let json = serde_json::to_value(&fee).unwrap();
        assert_eq!(json["type"], "percentage");
    }

    #[test]
    fn test_cancellation_note_line_names_role_and_reason() {
        let cancellation = Cancellation {
            by: Uuid::new_v4(),
            role: Role::Vendor,
            reason: "out of stock".to_string(),
            at: Utc::now(),
        };
        let line = cancellation.note_line("Lot Boutique A");
        assert!(line.contains("cancelled by vendor: out of stock"));
        assert!(line.contains("Lot Boutique A"));
    }
}
