use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::event_sourcing::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::fees::recompute_fee;
use super::value_objects::*;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub order_number: String,

    // Client
    pub client_id: Uuid,
    pub client: ClientContact,

    // Delivery
    pub delivery_mode: DeliveryMode,
    pub delivery_address: String,
    pub requested_at: DateTime<Utc>,
    pub same_day: bool,

    // Money (derived from active items)
    pub payment: Payment,
    pub base_total: Decimal,
    pub delivery_fee: DeliveryFee,
    pub total: Decimal,

    // Current State (derived from events)
    pub status: OrderStatus,
    pub lots: Vec<VendorLot>,
    pub note: Option<String>,
    pub notes: Vec<String>,
    pub collected: Option<Validation>,
    pub delivered: Option<Validation>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Totals derived from the active items and the fee rule captured at checkout
pub fn recompute_totals(order: &OrderAggregate) -> Totals {
    let base_total: Decimal = order.lots.iter().map(VendorLot::active_subtotal).sum();
    let delivery_fee = recompute_fee(&order.delivery_fee, base_total);
    let total = base_total + delivery_fee.amount;
    Totals { base_total, delivery_fee, total }
}

fn status_rank(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::AwaitingVendorAcceptance => 0,
        OrderStatus::Preparing => 1,
        OrderStatus::ReadyForPickup | OrderStatus::InDelivery => 2,
        OrderStatus::Delivered => 3,
        OrderStatus::Cancelled => 4,
    }
}

impl OrderAggregate {
    /// Validate a checkout snapshot and emit the creation event
    pub fn place(placed: OrderPlaced) -> Result<Vec<OrderEvent>, OrderError> {
        if placed.lots.is_empty() || placed.lots.iter().any(|lot| lot.items.is_empty()) {
            return Err(OrderError::EmptyCart);
        }
        if let Some(item) = placed.lots.iter().flat_map(|lot| &lot.items).find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidQuantity(item.product_id));
        }
        let mut items = placed.lots.iter().flat_map(|lot| &lot.items);
        if let Some(item) = items.find(|item| item.unit_price <= Decimal::ZERO) {
            return Err(OrderError::InvalidPrice(item.product_id));
        }
        if placed.delivery_mode != DeliveryMode::Collect && placed.delivery_address.trim().is_empty() {
            return Err(OrderError::MissingDeliveryAddress);
        }

        Ok(vec![OrderEvent::Placed(placed)])
    }

    pub fn lot(&self, vendor_id: Uuid) -> Option<&VendorLot> {
        self.lots.iter().find(|lot| lot.vendor_id == vendor_id)
    }

    fn lot_mut(&mut self, vendor_id: Uuid) -> Result<&mut VendorLot, OrderError> {
        self.lots
            .iter_mut()
            .find(|lot| lot.vendor_id == vendor_id)
            .ok_or(OrderError::LotNotFound(vendor_id))
    }

    pub fn involves_vendor(&self, vendor_id: Uuid) -> bool {
        self.lot(vendor_id).is_some()
    }

    pub fn vendor_ids(&self) -> Vec<Uuid> {
        self.lots.iter().map(|lot| lot.vendor_id).collect()
    }

    pub fn any_depot_confirmed(&self) -> bool {
        self.lots.iter().any(|lot| lot.depot.is_confirmed())
    }

    /// Whether `caller` may read this order
    pub fn visible_to(&self, caller: &Caller) -> bool {
        match caller.role {
            Role::Client => caller.user_id == self.client_id,
            Role::Vendor => caller.vendor_id.is_some_and(|v| self.involves_vendor(v)),
            Role::Admin | Role::Validator => true,
        }
    }

    fn depot_target_status(&self) -> (LotStatus, OrderStatus) {
        if self.delivery_mode == DeliveryMode::Collect {
            (LotStatus::ReadyForPickup, OrderStatus::ReadyForPickup)
        } else {
            (LotStatus::InDelivery, OrderStatus::InDelivery)
        }
    }

    fn apply_totals(&mut self) {
        let totals = recompute_totals(self);
        self.base_total = totals.base_total;
        self.delivery_fee = totals.delivery_fee;
        self.total = totals.total;
    }

    /// Cascade cancellation upward, then promote the order as far as its
    /// remaining lots allow. Never moves the status backwards.
    fn derive_status(&mut self) {
        let remaining: Vec<&VendorLot> = self.lots.iter().filter(|lot| !lot.is_cancelled()).collect();

        if remaining.is_empty() {
            self.status = OrderStatus::Cancelled;
            return;
        }
        if self.status.is_terminal() {
            return;
        }

        let candidate = if self.delivery_mode.routes_through_depot()
            && remaining.iter().all(|lot| lot.depot.is_confirmed())
        {
            self.depot_target_status().1
        } else if remaining.iter().all(|lot| lot.accepted) {
            OrderStatus::Preparing
        } else {
            self.status
        };

        if status_rank(candidate) > status_rank(self.status) {
            self.status = candidate;
        }
    }

    fn cancel_lot_in_place(lot: &mut VendorLot) {
        lot.status = LotStatus::Cancelled;
        for item in &mut lot.items {
            item.status = ItemStatus::Cancelled;
        }
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    fn ensure_open(&self, action: &'static str) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Cancelled => Err(OrderError::AlreadyCancelled),
            OrderStatus::Delivered => Err(OrderError::invalid(action, self.status)),
            _ => Ok(()),
        }
    }

    fn ensure_owner(&self, caller: &Caller) -> Result<(), OrderError> {
        if caller.user_id == self.client_id {
            Ok(())
        } else {
            Err(OrderError::Forbidden("order belongs to another client"))
        }
    }

    /// Lot of the calling vendor staff member
    fn own_lot(&self, caller: &Caller) -> Result<&VendorLot, OrderError> {
        let vendor_id = match (caller.role, caller.vendor_id) {
            (Role::Vendor, Some(vendor_id)) => vendor_id,
            _ => return Err(OrderError::Forbidden("only vendor staff can act on a lot")),
        };
        self.lot(vendor_id).ok_or(OrderError::Forbidden("lot belongs to another vendor"))
    }

    fn ensure_depot_routed(&self, action: &'static str) -> Result<(), OrderError> {
        if self.delivery_mode.routes_through_depot() {
            Ok(())
        } else {
            Err(OrderError::invalid(action, self.delivery_mode))
        }
    }

    fn cancellation(caller: &Caller, reason: &str, at: DateTime<Utc>) -> Result<Cancellation, OrderError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::MissingReason);
        }
        Ok(Cancellation { by: caller.user_id, role: caller.role, reason: reason.to_string(), at })
    }

    // ------------------------------------------------------------------------
    // Command handlers
    // ------------------------------------------------------------------------

    fn handle_accept(&self, caller: &Caller, at: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        let lot = self.own_lot(caller)?;
        if self.status == OrderStatus::Cancelled || lot.is_cancelled() {
            return Err(OrderError::AlreadyCancelled);
        }
        if lot.status != LotStatus::AwaitingVendorAcceptance {
            return Err(OrderError::invalid("accept lot", lot.status));
        }

        Ok(vec![OrderEvent::LotAccepted(LotAccepted {
            vendor_id: lot.vendor_id,
            accepted_by: caller.user_id,
            at,
        })])
    }

    fn handle_start_delivery(&self, caller: &Caller, at: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        let lot = self.own_lot(caller)?;
        self.ensure_open("start delivery")?;
        if lot.is_cancelled() {
            return Err(OrderError::AlreadyCancelled);
        }
        if self.delivery_mode != DeliveryMode::VendorDirect {
            return Err(OrderError::invalid("start direct delivery", self.delivery_mode));
        }
        if lot.status != LotStatus::Preparing {
            return Err(OrderError::invalid("start delivery", lot.status));
        }

        Ok(vec![OrderEvent::DirectDeliveryStarted(DirectDeliveryStarted {
            vendor_id: lot.vendor_id,
            started_by: caller.user_id,
            at,
        })])
    }

    fn handle_mark_depot(&self, caller: &Caller, at: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        let lot = self.own_lot(caller)?;
        self.ensure_open("mark depot drop-off")?;
        if lot.is_cancelled() {
            return Err(OrderError::AlreadyCancelled);
        }
        self.ensure_depot_routed("mark depot drop-off")?;
        if lot.status != LotStatus::Preparing {
            return Err(OrderError::invalid("mark depot drop-off", lot.status));
        }
        if lot.depot.done {
            return Err(OrderError::invalid("mark depot drop-off", "already dropped off"));
        }

        Ok(vec![OrderEvent::DepotDropOffMarked(DepotDropOffMarked {
            vendor_id: lot.vendor_id,
            marked_by: caller.user_id,
            at,
        })])
    }

    fn handle_confirm_depot(
        &self,
        caller: &Caller,
        vendor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if caller.role != Role::Admin {
            return Err(OrderError::Forbidden("only admins confirm depot receipt"));
        }
        self.ensure_open("confirm depot receipt")?;
        self.ensure_depot_routed("confirm depot receipt")?;
        let lot = self.lot(vendor_id).ok_or(OrderError::LotNotFound(vendor_id))?;
        if lot.is_cancelled() {
            return Err(OrderError::AlreadyCancelled);
        }
        if lot.depot.is_confirmed() {
            return Err(OrderError::invalid("confirm depot receipt", "already confirmed"));
        }

        Ok(vec![OrderEvent::DepotReceiptConfirmed(DepotReceiptConfirmed {
            vendor_id,
            admin_id: caller.user_id,
            at,
        })])
    }

    fn handle_confirm_receipt(&self, caller: &Caller, at: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        match caller.role {
            Role::Client => self.ensure_owner(caller)?,
            Role::Admin | Role::Validator => {}
            Role::Vendor => return Err(OrderError::Forbidden("vendors cannot confirm receipt")),
        }
        self.ensure_open("confirm receipt")?;

        let kind = if self.delivery_mode == DeliveryMode::Collect {
            ReceiptKind::Collected
        } else {
            ReceiptKind::Delivered
        };

        Ok(vec![OrderEvent::ReceiptConfirmed(ReceiptConfirmed {
            kind,
            validation: Validation { validated_by: caller.user_id, role: caller.role, at },
        })])
    }

    fn handle_cancel(&self, caller: &Caller, reason: &str, at: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        if caller.role == Role::Validator {
            return Err(OrderError::Forbidden("validators cannot cancel orders"));
        }
        let cancellation = Self::cancellation(caller, reason, at)?;

        match caller.role {
            Role::Admin => {
                if self.status == OrderStatus::Cancelled {
                    return Err(OrderError::AlreadyCancelled);
                }
                Ok(vec![OrderEvent::OrderCancelled(OrderCancelled { cancellation })])
            }
            Role::Client => {
                self.ensure_owner(caller)?;
                self.ensure_open("cancel order")?;
                if self.any_depot_confirmed() {
                    return Err(OrderError::AlreadyInTransit);
                }
                Ok(vec![OrderEvent::OrderCancelled(OrderCancelled { cancellation })])
            }
            Role::Vendor => {
                let lot = self.own_lot(caller)?;
                if lot.is_cancelled() {
                    return Err(OrderError::AlreadyCancelled);
                }
                self.ensure_open("cancel lot")?;
                if lot.depot.is_confirmed() {
                    return Err(OrderError::AlreadyInTransit);
                }
                Ok(vec![OrderEvent::LotCancelled(LotCancelled {
                    vendor_id: lot.vendor_id,
                    cancellation,
                })])
            }
            Role::Validator => Err(OrderError::Forbidden("validators cannot cancel orders")),
        }
    }

    fn handle_cancel_item(
        &self,
        caller: &Caller,
        vendor_id: Uuid,
        product_id: Uuid,
        variation_id: Option<Uuid>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        match caller.role {
            Role::Client => self.ensure_owner(caller)?,
            Role::Vendor if caller.vendor_id == Some(vendor_id) => {}
            Role::Vendor => return Err(OrderError::Forbidden("lot belongs to another vendor")),
            Role::Admin | Role::Validator => {
                return Err(OrderError::Forbidden("only the client or the vendor can cancel an item"))
            }
        }
        let cancellation = Self::cancellation(caller, reason, at)?;

        let lot = self.lot(vendor_id).ok_or(OrderError::LotNotFound(vendor_id))?;
        if lot.depot.is_confirmed() {
            return Err(OrderError::AlreadyInTransit);
        }
        if self.status == OrderStatus::Delivered {
            return Err(OrderError::invalid("cancel item", self.status));
        }

        let matches = |item: &OrderItem| {
            item.product_id == product_id && variation_id.map_or(true, |v| item.variation_id == Some(v))
        };

        if let Some(item_index) = lot.items.iter().position(|item| item.is_active() && matches(item)) {
            return Ok(vec![OrderEvent::ItemCancelled(ItemCancelled {
                vendor_id,
                product_id,
                variation_id: lot.items[item_index].variation_id,
                item_index,
                cancellation,
            })]);
        }

        if lot.items.iter().any(|item| matches(item)) {
            // Already cancelled: nothing to do
            return Ok(vec![]);
        }

        Err(OrderError::ItemNotFound(product_id))
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Placed(e) => {
                let mut order = Self {
                    id: e.order_id,
                    version: 0,
                    order_number: e.order_number.clone(),
                    client_id: e.client_id,
                    client: e.client.clone(),
                    delivery_mode: e.delivery_mode,
                    delivery_address: e.delivery_address.clone(),
                    requested_at: e.requested_at,
                    same_day: e.same_day,
                    payment: Payment::unpaid(e.payment_method.clone()),
                    base_total: Decimal::ZERO,
                    delivery_fee: e.delivery_fee.clone(),
                    total: Decimal::ZERO,
                    status: OrderStatus::AwaitingVendorAcceptance,
                    lots: e.lots.clone(),
                    note: e.note.clone(),
                    notes: Vec::new(),
                    collected: None,
                    delivered: None,
                    created_at: e.placed_at,
                    updated_at: e.placed_at,
                };
                order.apply_totals();
                Ok(order)
            }
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = event.occurred_at();

        match event {
            OrderEvent::Placed(_) => {
                // First event already applied
            }
            OrderEvent::LotAccepted(e) => {
                let lot = self.lot_mut(e.vendor_id)?;
                lot.accepted = true;
                lot.accepted_at = Some(e.at);
                lot.status = LotStatus::Preparing;
            }
            OrderEvent::DirectDeliveryStarted(e) => {
                self.lot_mut(e.vendor_id)?.status = LotStatus::InDelivery;
                self.status = OrderStatus::InDelivery;
            }
            OrderEvent::DepotDropOffMarked(e) => {
                let lot = self.lot_mut(e.vendor_id)?;
                lot.depot.done = true;
                lot.depot.dropped_off_at = Some(e.at);
            }
            OrderEvent::DepotReceiptConfirmed(e) => {
                let (lot_status, _) = self.depot_target_status();
                let lot = self.lot_mut(e.vendor_id)?;
                lot.depot.done = true;
                lot.depot.dropped_off_at.get_or_insert(e.at);
                lot.depot.confirmed_by = Some(e.admin_id);
                lot.depot.confirmed_at = Some(e.at);
                lot.status = lot_status;
            }
            OrderEvent::ReceiptConfirmed(e) => {
                match e.kind {
                    ReceiptKind::Collected => self.collected = Some(e.validation.clone()),
                    ReceiptKind::Delivered => self.delivered = Some(e.validation.clone()),
                }
                for lot in self.lots.iter_mut().filter(|lot| !lot.is_cancelled()) {
                    lot.status = LotStatus::Delivered;
                }
                self.status = OrderStatus::Delivered;
                self.payment.status = PaymentStatus::Paid;
                self.payment.paid_amount = self.total;
                self.payment.paid_at = Some(e.validation.at);
            }
            OrderEvent::OrderCancelled(e) => {
                for lot in &mut self.lots {
                    Self::cancel_lot_in_place(lot);
                }
                self.notes.push(e.cancellation.note_line("Order"));
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::LotCancelled(e) => {
                let lot = self.lot_mut(e.vendor_id)?;
                Self::cancel_lot_in_place(lot);
                let line = e.cancellation.note_line(&format!("Lot {}", lot.vendor_name));
                self.notes.push(line);
            }
            OrderEvent::ItemCancelled(e) => {
                let lot = self.lot_mut(e.vendor_id)?;
                let item = lot.items.get_mut(e.item_index).ok_or(OrderError::ItemNotFound(e.product_id))?;
                item.status = ItemStatus::Cancelled;
                let scope = format!("Item {} of lot {}", item.product_name, lot.vendor_name);
                if !lot.has_active_items() {
                    lot.status = LotStatus::Cancelled;
                }
                self.notes.push(e.cancellation.note_line(&scope));
            }
        }

        self.apply_totals();
        self.derive_status();
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::AcceptLot { caller, at } => self.handle_accept(caller, *at),
            OrderCommand::StartDirectDelivery { caller, at } => self.handle_start_delivery(caller, *at),
            OrderCommand::MarkDepotDropOff { caller, at } => self.handle_mark_depot(caller, *at),
            OrderCommand::ConfirmDepotReceipt { caller, vendor_id, at } => {
                self.handle_confirm_depot(caller, *vendor_id, *at)
            }
            OrderCommand::ConfirmReceipt { caller, at } => self.handle_confirm_receipt(caller, *at),
            OrderCommand::Cancel { caller, reason, at } => self.handle_cancel(caller, reason, *at),
            OrderCommand::CancelItem { caller, vendor_id, product_id, variation_id, reason, at } => {
                self.handle_cancel_item(caller, *vendor_id, *product_id, *variation_id, reason, *at)
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
