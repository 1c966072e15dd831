use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::serialize::row::SerializeRow;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{OrderAggregate, OrderReadModel};
use crate::event_sourcing::lwt_applied;

// ============================================================================
// ScyllaDB Order Read Model
// ============================================================================
//
// One JSON document per order, written to three tables so that every listing
// is a single-partition read:
// - orders            (by order id, also used for the admin listing)
// - orders_by_client  (client partition, newest first)
// - orders_by_vendor  (one row per involved vendor, newest first)
//
// Order numbers are claimed with a lightweight transaction in `order_numbers`.
//
// ============================================================================

pub struct ScyllaOrderReadModel {
    session: Arc<Session>,
}

impl ScyllaOrderReadModel {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn fetch_orders(&self, cql: &str, values: impl SerializeRow + Send) -> anyhow::Result<Vec<OrderAggregate>> {
        let result = self.session.query_unpaged(cql, values).await?;
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        let mut orders = Vec::new();
        for row in rows_result.rows::<(String,)>()? {
            let (document,) = row?;
            orders.push(serde_json::from_str(&document)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderReadModel for ScyllaOrderReadModel {
    async fn upsert(&self, order: &OrderAggregate) -> anyhow::Result<()> {
        let document = serde_json::to_string(order)?;

        self.session
            .query_unpaged(
                "INSERT INTO orders (order_id, client_id, created_at, document) VALUES (?, ?, ?, ?)",
                (order.id, order.client_id, order.created_at, &document),
            )
            .await?;

        self.session
            .query_unpaged(
                "INSERT INTO orders_by_client (client_id, created_at, order_id, document) VALUES (?, ?, ?, ?)",
                (order.client_id, order.created_at, order.id, &document),
            )
            .await?;

        for vendor_id in order.vendor_ids() {
            self.session
                .query_unpaged(
                    "INSERT INTO orders_by_vendor (vendor_id, created_at, order_id, document) VALUES (?, ?, ?, ?)",
                    (vendor_id, order.created_at, order.id, &document),
                )
                .await?;
        }

        tracing::debug!(order_id = %order.id, version = order.version, "Order projection updated");
        Ok(())
    }

    async fn list_for_client(&self, client_id: Uuid) -> anyhow::Result<Vec<OrderAggregate>> {
        self.fetch_orders("SELECT document FROM orders_by_client WHERE client_id = ?", (client_id,))
            .await
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> anyhow::Result<Vec<OrderAggregate>> {
        self.fetch_orders("SELECT document FROM orders_by_vendor WHERE vendor_id = ?", (vendor_id,))
            .await
    }

    async fn list_all(&self) -> anyhow::Result<Vec<OrderAggregate>> {
        let mut orders = self.fetch_orders("SELECT document FROM orders", ()).await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let result = self
            .session
            .query_unpaged("SELECT COUNT(*) FROM order_numbers", &[])
            .await?;
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(0),
        };

        match rows_result.maybe_first_row::<(i64,)>()? {
            Some((count,)) => Ok(count.max(0) as u64),
            None => Ok(0),
        }
    }

    async fn reserve_order_number(&self, order_number: &str, order_id: Uuid) -> anyhow::Result<bool> {
        let result = self
            .session
            .query_unpaged(
                "INSERT INTO order_numbers (order_number, order_id) VALUES (?, ?) IF NOT EXISTS",
                (order_number, order_id),
            )
            .await?;
        lwt_applied(result)
    }
}
