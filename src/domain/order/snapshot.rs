use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::collaborators::{CartLine, CartService, PriceHistory, UserDirectory, VendorDirectory, VendorProfile};
use super::errors::OrderError;
use super::events::OrderPlaced;
use super::fees::{compute_delivery_fee, select_fee_rule};
use super::value_objects::*;

// ============================================================================
// Order Snapshot Builder
// ============================================================================
//
// Turns the client's cart into an immutable order document. Names, images and
// prices are copied so later catalog edits never alter a placed order.
// Nothing is persisted here; every precondition fails before any write.
//
// ============================================================================

/// Checkout parameters chosen by the client
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub delivery_mode: DeliveryMode,
    pub delivery_address: Option<String>,
    pub payment_method: String,
    pub note: Option<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    /// Fixed fee when no platform rule exists for home delivery
    pub default_delivery_fee: Decimal,
    /// Timezone that decides what "today" means for same-day requests
    pub business_offset: FixedOffset,
    /// Address recorded for orders collected at the warehouse
    pub warehouse_pickup_label: String,
}

/// Order snapshot waiting for its order number
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order_id: Uuid,
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
    pub created_at: DateTime<Utc>,
}

impl OrderDraft {
    pub fn into_placed(self, order_number: String) -> OrderPlaced {
        OrderPlaced {
            order_id: self.order_id,
            order_number,
            client_id: self.client_id,
            client: self.client,
            delivery_mode: self.delivery_mode,
            delivery_address: self.delivery_address,
            payment_method: self.payment_method,
            delivery_fee: self.delivery_fee,
            requested_at: self.requested_at,
            same_day: self.same_day,
            lots: self.lots,
            note: self.note,
            placed_at: self.created_at,
        }
    }
}

/// True when `requested_at` falls on the same business calendar day as `now`
pub fn is_same_day(requested_at: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    requested_at.with_timezone(&offset).date_naive() == now.with_timezone(&offset).date_naive()
}

/// Cart lines grouped by vendor, vendors in order of first appearance
pub fn group_by_vendor(lines: &[CartLine]) -> Vec<(Uuid, Vec<CartLine>)> {
    let mut groups: Vec<(Uuid, Vec<CartLine>)> = Vec::new();
    for line in lines {
        match groups.iter_mut().find(|(vendor_id, _)| *vendor_id == line.vendor_id) {
            Some((_, group)) => group.push(line.clone()),
            None => groups.push((line.vendor_id, vec![line.clone()])),
        }
    }
    groups
}

/// Delivery-mode preconditions that only depend on the cart's shape
pub fn check_delivery_mode(
    mode: DeliveryMode,
    same_day: bool,
    vendors: &[VendorProfile],
) -> Result<(), OrderError> {
    if same_day && mode != DeliveryMode::VendorDirect {
        return Err(OrderError::InvalidDeliveryMode);
    }

    if mode == DeliveryMode::VendorDirect {
        let [vendor] = vendors else {
            return Err(OrderError::MultiVendorDirectDelivery { vendor_count: vendors.len() });
        };
        if !vendor.offers_direct_delivery {
            return Err(OrderError::DeliveryNotOffered(vendor.id));
        }
        if same_day && !vendor.allows_same_day {
            return Err(OrderError::SameDayNotAllowed(vendor.id));
        }
    }

    Ok(())
}

pub struct OrderSnapshotBuilder {
    carts: Arc<dyn CartService>,
    vendors: Arc<dyn VendorDirectory>,
    prices: Arc<dyn PriceHistory>,
    users: Arc<dyn UserDirectory>,
    settings: SnapshotSettings,
}

impl OrderSnapshotBuilder {
    pub fn new(
        carts: Arc<dyn CartService>,
        vendors: Arc<dyn VendorDirectory>,
        prices: Arc<dyn PriceHistory>,
        users: Arc<dyn UserDirectory>,
        settings: SnapshotSettings,
    ) -> Self {
        Self { carts, vendors, prices, users, settings }
    }

    pub async fn build(
        &self,
        client_id: Uuid,
        request: &PlaceOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<OrderDraft, OrderError> {
        let cart = match self.carts.load_cart(client_id).await? {
            Some(cart) if !cart.lines.is_empty() => cart,
            _ => return Err(OrderError::EmptyCart),
        };
        if let Some(line) = cart.lines.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::InvalidQuantity(line.product_id));
        }
        if let Some(line) = cart.lines.iter().find(|line| line.unit_price <= Decimal::ZERO) {
            return Err(OrderError::InvalidPrice(line.product_id));
        }

        let groups = group_by_vendor(&cart.lines);
        let mut profiles = Vec::with_capacity(groups.len());
        for (vendor_id, _) in &groups {
            let profile = self
                .vendors
                .vendor(*vendor_id)
                .await?
                .ok_or(OrderError::VendorNotFound(*vendor_id))?;
            profiles.push(profile);
        }

        let same_day = is_same_day(request.requested_at, now, self.settings.business_offset);
        check_delivery_mode(request.delivery_mode, same_day, &profiles)?;

        let delivery_address = if request.delivery_mode == DeliveryMode::Collect {
            self.settings.warehouse_pickup_label.clone()
        } else {
            match request.delivery_address.as_deref().map(str::trim) {
                Some(address) if !address.is_empty() => address.to_string(),
                _ => return Err(OrderError::MissingDeliveryAddress),
            }
        };

        let client = self
            .users
            .client_contact(client_id)
            .await?
            .ok_or(OrderError::ClientNotFound(client_id))?;

        let mut lots = Vec::with_capacity(groups.len());
        for ((vendor_id, lines), profile) in groups.into_iter().zip(&profiles) {
            let mut items = Vec::with_capacity(lines.len());
            for line in lines {
                let price_record_id = self
                    .prices
                    .active_price_record(line.product_id, line.variation_id)
                    .await?;
                items.push(OrderItem {
                    product_id: line.product_id,
                    variation_id: line.variation_id,
                    vendor_id,
                    price_record_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    product_name: line.product_name,
                    image: line.image,
                    coupon_id: line.coupon_id,
                    promotion_id: line.promotion_id,
                    status: ItemStatus::Active,
                });
            }
            lots.push(VendorLot {
                vendor_id,
                vendor_name: profile.name.clone(),
                accepted: false,
                accepted_at: None,
                depot: DepotHandOff::default(),
                status: LotStatus::AwaitingVendorAcceptance,
                items,
            });
        }

        let base_total: Decimal = lots.iter().map(VendorLot::active_subtotal).sum();
        let delivery_fee = self.delivery_fee(request.delivery_mode, &profiles, base_total).await?;

        tracing::debug!(
            client_id = %client_id,
            lots = lots.len(),
            base_total = %base_total,
            fee = %delivery_fee.amount,
            same_day,
            "Order snapshot built"
        );

        Ok(OrderDraft {
            order_id: Uuid::now_v7(),
            client_id,
            client,
            delivery_mode: request.delivery_mode,
            delivery_address,
            payment_method: request.payment_method.clone(),
            delivery_fee,
            requested_at: request.requested_at,
            same_day,
            lots,
            note: request.note.clone().filter(|note| !note.trim().is_empty()),
            created_at: now,
        })
    }

    async fn delivery_fee(
        &self,
        mode: DeliveryMode,
        profiles: &[VendorProfile],
        base_total: Decimal,
    ) -> Result<DeliveryFee, OrderError> {
        let owner = match mode {
            DeliveryMode::Collect => {
                return Ok(compute_delivery_fee(mode, None, base_total, self.settings.default_delivery_fee))
            }
            DeliveryMode::VendorDirect => profiles.first().map(|vendor| vendor.id),
            DeliveryMode::SupermarketDelivery | DeliveryMode::VendorDelivery => None,
        };

        let rules = self.vendors.fee_rules(owner).await?;
        Ok(compute_delivery_fee(
            mode,
            select_fee_rule(&rules, owner),
            base_total,
            self.settings.default_delivery_fee,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collaborators::{Cart, InMemoryDirectory};
    use chrono::Duration;

    pub(crate) fn settings() -> SnapshotSettings {
        SnapshotSettings {
            default_delivery_fee: Decimal::from(2000),
            business_offset: FixedOffset::east_opt(3 * 3600).unwrap(),
            warehouse_pickup_label: "Retrait entrepot".to_string(),
        }
    }

    pub(crate) fn line(vendor_id: Uuid, unit_price: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            variation_id: None,
            vendor_id,
            quantity,
            unit_price: Decimal::from(unit_price),
            product_name: format!("product-{}", unit_price),
            image: Some("https://cdn.example.com/p.png".to_string()),
            coupon_id: None,
            promotion_id: None,
        }
    }

    pub(crate) fn vendor(id: Uuid, direct: bool, same_day: bool) -> VendorProfile {
        VendorProfile {
            id,
            name: format!("Boutique {}", &id.to_string()[..4]),
            offers_direct_delivery: direct,
            allows_same_day: same_day,
        }
    }

    pub(crate) fn request(mode: DeliveryMode, requested_at: DateTime<Utc>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            delivery_mode: mode,
            delivery_address: Some("Lot II A 12, Antananarivo".to_string()),
            payment_method: "cash".to_string(),
            note: Some("ring twice".to_string()),
            requested_at,
        }
    }

    /// Directory with one client and two vendors; A sells 2 x 1000, B 1 x 500
    pub(crate) async fn seeded() -> (InMemoryDirectory, Uuid, Uuid, Uuid) {
        let directory = InMemoryDirectory::new();
        let client_id = Uuid::new_v4();
        let vendor_a = Uuid::new_v4();
        let vendor_b = Uuid::new_v4();

        directory.put_vendor(vendor(vendor_a, true, true)).await;
        directory.put_vendor(vendor(vendor_b, false, false)).await;
        directory
            .put_client(
                client_id,
                ClientContact {
                    last_name: "Rakoto".to_string(),
                    first_name: "Aina".to_string(),
                    email: "aina@example.com".to_string(),
                    phone: Some("+261340000000".to_string()),
                },
            )
            .await;
        directory
            .put_cart(Cart {
                client_id,
                lines: vec![line(vendor_a, 1000, 2), line(vendor_b, 500, 1)],
            })
            .await;

        (directory, client_id, vendor_a, vendor_b)
    }

    pub(crate) fn builder(directory: &InMemoryDirectory) -> OrderSnapshotBuilder {
        let shared = Arc::new(directory.clone());
        OrderSnapshotBuilder::new(shared.clone(), shared.clone(), shared.clone(), shared, settings())
    }

    fn tomorrow() -> DateTime<Utc> {
        Utc::now() + Duration::days(1)
    }

    #[tokio::test]
    async fn test_builds_lots_in_cart_order() {
        let (directory, client_id, vendor_a, vendor_b) = seeded().await;
        let draft = builder(&directory)
            .build(client_id, &request(DeliveryMode::SupermarketDelivery, tomorrow()), Utc::now())
            .await
            .unwrap();

        assert_eq!(draft.lots.len(), 2);
        assert_eq!(draft.lots[0].vendor_id, vendor_a);
        assert_eq!(draft.lots[1].vendor_id, vendor_b);
        assert_eq!(draft.lots.iter().map(VendorLot::active_subtotal).sum::<Decimal>(), Decimal::from(2500));
        assert_eq!(draft.delivery_fee.amount, Decimal::from(2000));
        assert!(!draft.same_day);
        assert_eq!(draft.client.first_name, "Aina");
        assert!(draft.lots.iter().all(|lot| lot.status == LotStatus::AwaitingVendorAcceptance));
    }

    #[tokio::test]
    async fn test_items_reference_active_price_record() {
        let (directory, client_id, vendor_a, _) = seeded().await;
        let priced = line(vendor_a, 1500, 1);
        let unpriced = line(vendor_a, 300, 2);
        let record_id = Uuid::new_v4();
        directory.put_price_record(priced.product_id, None, record_id).await;
        directory
            .put_cart(Cart { client_id, lines: vec![priced.clone(), unpriced.clone()] })
            .await;

        let draft = builder(&directory)
            .build(client_id, &request(DeliveryMode::Collect, tomorrow()), Utc::now())
            .await
            .unwrap();

        let items = &draft.lots[0].items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id, priced.product_id);
        assert_eq!(items[0].price_record_id, Some(record_id));
        assert_eq!(items[1].price_record_id, None);
    }

    #[tokio::test]
    async fn test_missing_cart_is_empty_cart() {
        let (directory, _, _, _) = seeded().await;
        let err = builder(&directory)
            .build(Uuid::new_v4(), &request(DeliveryMode::Collect, tomorrow()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::EmptyCart));
    }

    #[tokio::test]
    async fn test_cart_lines_need_quantity_and_price() {
        let (directory, client_id, vendor_a, _) = seeded().await;
        let free = line(vendor_a, 0, 1);
        let free_product = free.product_id;
        directory.put_cart(Cart { client_id, lines: vec![line(vendor_a, 1000, 1), free] }).await;
        let err = builder(&directory)
            .build(client_id, &request(DeliveryMode::SupermarketDelivery, tomorrow()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidPrice(p) if p == free_product));

        directory.put_cart(Cart { client_id, lines: vec![line(vendor_a, -50, 1)] }).await;
        let err = builder(&directory)
            .build(client_id, &request(DeliveryMode::SupermarketDelivery, tomorrow()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_price");

        directory.put_cart(Cart { client_id, lines: vec![line(vendor_a, 1000, 0)] }).await;
        let err = builder(&directory)
            .build(client_id, &request(DeliveryMode::SupermarketDelivery, tomorrow()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn test_vendor_direct_with_two_vendors_is_rejected() {
        let (directory, client_id, _, _) = seeded().await;
        let err = builder(&directory)
            .build(client_id, &request(DeliveryMode::VendorDirect, tomorrow()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::MultiVendorDirectDelivery { vendor_count: 2 }));
    }

    #[tokio::test]
    async fn test_same_day_requires_vendor_direct() {
        let (directory, client_id, _, _) = seeded().await;
        let now = Utc::now();
        let err = builder(&directory)
            .build(client_id, &request(DeliveryMode::SupermarketDelivery, now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidDeliveryMode));
    }

    #[tokio::test]
    async fn test_collect_uses_pickup_label_and_no_fee() {
        let (directory, client_id, _, _) = seeded().await;
        let mut req = request(DeliveryMode::Collect, tomorrow());
        req.delivery_address = None;

        let draft = builder(&directory).build(client_id, &req, Utc::now()).await.unwrap();
        assert_eq!(draft.delivery_address, "Retrait entrepot");
        assert_eq!(draft.delivery_fee.amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_home_delivery_requires_address() {
        let (directory, client_id, _, _) = seeded().await;
        let mut req = request(DeliveryMode::VendorDelivery, tomorrow());
        req.delivery_address = Some("   ".to_string());

        let err = builder(&directory).build(client_id, &req, Utc::now()).await.unwrap_err();
        assert!(matches!(err, OrderError::MissingDeliveryAddress));
    }

    #[tokio::test]
    async fn test_vendor_direct_uses_vendor_fee_rule() {
        let directory = InMemoryDirectory::new();
        let client_id = Uuid::new_v4();
        let vendor_id = Uuid::new_v4();
        directory.put_vendor(vendor(vendor_id, true, false)).await;
        directory
            .put_client(
                client_id,
                ClientContact {
                    last_name: "Rabe".to_string(),
                    first_name: "Hery".to_string(),
                    email: "hery@example.com".to_string(),
                    phone: None,
                },
            )
            .await;
        directory.put_cart(Cart { client_id, lines: vec![line(vendor_id, 1000, 3)] }).await;
        directory
            .put_fee_rule(FeeRule {
                id: Uuid::new_v4(),
                vendor_id: Some(vendor_id),
                kind: FeeKind::Percentage,
                value: Decimal::from(5),
                active: true,
                created_at: Utc::now(),
            })
            .await;

        let draft = builder(&directory)
            .build(client_id, &request(DeliveryMode::VendorDirect, tomorrow()), Utc::now())
            .await
            .unwrap();
        assert_eq!(draft.delivery_fee.kind, FeeKind::Percentage);
        assert_eq!(draft.delivery_fee.amount, Decimal::from(150));

        // Same day is refused because this vendor does not allow it
        let now = Utc::now();
        let err = builder(&directory)
            .build(client_id, &request(DeliveryMode::VendorDirect, now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::SameDayNotAllowed(id) if id == vendor_id));
    }

    #[test]
    fn test_same_day_uses_business_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        // 22:30 UTC is already the next day at UTC+3
        let now = DateTime::parse_from_rfc3339("2026-03-01T22:30:00Z").unwrap().with_timezone(&Utc);
        let next_morning = DateTime::parse_from_rfc3339("2026-03-02T06:00:00Z").unwrap().with_timezone(&Utc);
        assert!(is_same_day(next_morning, now, offset));
        assert!(!is_same_day(next_morning, now, FixedOffset::east_opt(0).unwrap()));
    }

    #[test]
    fn test_direct_delivery_not_offered() {
        let vendor = vendor(Uuid::new_v4(), false, false);
        let err = check_delivery_mode(DeliveryMode::VendorDirect, false, std::slice::from_ref(&vendor)).unwrap_err();
        assert!(matches!(err, OrderError::DeliveryNotOffered(_)));
    }
}
