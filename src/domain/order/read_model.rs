use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::aggregate::OrderAggregate;

// ============================================================================
// Order Read Model
// ============================================================================
//
// Denormalized projection of the latest order state, used for listings and
// for reserving order numbers. The event stream stays the source of truth.
//
// ============================================================================

#[async_trait]
pub trait OrderReadModel: Send + Sync {
    async fn upsert(&self, order: &OrderAggregate) -> anyhow::Result<()>;

    async fn list_for_client(&self, client_id: Uuid) -> anyhow::Result<Vec<OrderAggregate>>;

    async fn list_for_vendor(&self, vendor_id: Uuid) -> anyhow::Result<Vec<OrderAggregate>>;

    async fn list_all(&self) -> anyhow::Result<Vec<OrderAggregate>>;

    /// Number of orders placed so far
    async fn count(&self) -> anyhow::Result<u64>;

    /// Claim `order_number` for `order_id`; `false` when it is already taken
    async fn reserve_order_number(&self, order_number: &str, order_id: Uuid) -> anyhow::Result<bool>;
}

fn newest_first(mut orders: Vec<OrderAggregate>) -> Vec<OrderAggregate> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[derive(Default)]
pub struct InMemoryOrderReadModel {
    orders: Arc<RwLock<HashMap<Uuid, OrderAggregate>>>,
    numbers: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl InMemoryOrderReadModel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderReadModel for InMemoryOrderReadModel {
    async fn upsert(&self, order: &OrderAggregate) -> anyhow::Result<()> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn list_for_client(&self, client_id: Uuid) -> anyhow::Result<Vec<OrderAggregate>> {
        let orders = self.orders.read().await;
        Ok(newest_first(
            orders.values().filter(|o| o.client_id == client_id).cloned().collect(),
        ))
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> anyhow::Result<Vec<OrderAggregate>> {
        let orders = self.orders.read().await;
        Ok(newest_first(
            orders.values().filter(|o| o.involves_vendor(vendor_id)).cloned().collect(),
        ))
    }

    async fn list_all(&self) -> anyhow::Result<Vec<OrderAggregate>> {
        Ok(newest_first(self.orders.read().await.values().cloned().collect()))
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.numbers.read().await.len() as u64)
    }

    async fn reserve_order_number(&self, order_number: &str, order_id: Uuid) -> anyhow::Result<bool> {
        let mut numbers = self.numbers.write().await;
        if numbers.contains_key(order_number) {
            return Ok(false);
        }
        numbers.insert(order_number.to_string(), order_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::Fixture;
    use crate::domain::order::DeliveryMode;

    #[tokio::test]
    async fn test_reservation_is_first_come() {
        let model = InMemoryOrderReadModel::new();
        assert!(model.reserve_order_number("CMD-1", Uuid::new_v4()).await.unwrap());
        assert!(!model.reserve_order_number("CMD-1", Uuid::new_v4()).await.unwrap());
        assert_eq!(model.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_listings_filter_by_party() {
        let model = InMemoryOrderReadModel::new();
        let f = Fixture::new();
        let order = f.order(DeliveryMode::SupermarketDelivery);
        model.upsert(&order).await.unwrap();

        assert_eq!(model.list_for_client(f.client).await.unwrap().len(), 1);
        assert_eq!(model.list_for_vendor(f.vendor_b).await.unwrap().len(), 1);
        assert!(model.list_for_client(Uuid::new_v4()).await.unwrap().is_empty());
        assert!(model.list_for_vendor(Uuid::new_v4()).await.unwrap().is_empty());
        assert_eq!(model.list_all().await.unwrap().len(), 1);
    }
}
