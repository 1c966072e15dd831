use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::serialize::row::SerializeRow;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{ClientContact, FeeRule};
use super::{Cart, CartService, PriceHistory, UserDirectory, VendorDirectory, VendorProfile};

// ============================================================================
// ScyllaDB Directory
// ============================================================================
//
// Collaborator data kept as JSON documents keyed by id. Platform fee rules
// and variation-less price records use the nil UUID as their key.
//
// ============================================================================

pub struct ScyllaDirectory {
    session: Arc<Session>,
}

impl ScyllaDirectory {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn fetch_document<T: DeserializeOwned>(&self, cql: &str, id: Uuid) -> anyhow::Result<Option<T>> {
        let result = self.session.query_unpaged(cql, (id,)).await?;
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows_result.maybe_first_row::<(String,)>()? {
            Some((document,)) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    async fn fetch_ids(&self, cql: &str, values: impl SerializeRow + Send) -> anyhow::Result<Vec<Uuid>> {
        let result = self.session.query_unpaged(cql, values).await?;
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        let mut ids = Vec::new();
        for row in rows_result.rows::<(Uuid,)>()? {
            ids.push(row?.0);
        }
        Ok(ids)
    }
}

#[async_trait]
impl CartService for ScyllaDirectory {
    async fn load_cart(&self, client_id: Uuid) -> anyhow::Result<Option<Cart>> {
        self.fetch_document("SELECT document FROM carts WHERE client_id = ?", client_id).await
    }

    async fn clear_cart(&self, client_id: Uuid) -> anyhow::Result<()> {
        self.session
            .query_unpaged("DELETE FROM carts WHERE client_id = ?", (client_id,))
            .await?;
        tracing::debug!(client_id = %client_id, "Cart cleared");
        Ok(())
    }
}

#[async_trait]
impl VendorDirectory for ScyllaDirectory {
    async fn vendor(&self, vendor_id: Uuid) -> anyhow::Result<Option<VendorProfile>> {
        self.fetch_document("SELECT document FROM vendors WHERE vendor_id = ?", vendor_id).await
    }

    async fn fee_rules(&self, vendor_id: Option<Uuid>) -> anyhow::Result<Vec<FeeRule>> {
        let owner_id = vendor_id.unwrap_or(Uuid::nil());
        let result = self
            .session
            .query_unpaged("SELECT document FROM fee_rules WHERE owner_id = ?", (owner_id,))
            .await?;
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        let mut rules = Vec::new();
        for row in rows_result.rows::<(String,)>()? {
            let (document,) = row?;
            rules.push(serde_json::from_str(&document)?);
        }
        Ok(rules)
    }
}

#[async_trait]
impl PriceHistory for ScyllaDirectory {
    async fn active_price_record(
        &self,
        product_id: Uuid,
        variation_id: Option<Uuid>,
    ) -> anyhow::Result<Option<Uuid>> {
        let ids = self
            .fetch_ids(
                "SELECT record_id FROM price_records WHERE product_id = ? AND variation_id = ?",
                (product_id, variation_id.unwrap_or(Uuid::nil())),
            )
            .await?;
        Ok(ids.into_iter().next())
    }
}

#[async_trait]
impl UserDirectory for ScyllaDirectory {
    async fn client_contact(&self, client_id: Uuid) -> anyhow::Result<Option<ClientContact>> {
        self.fetch_document("SELECT document FROM client_contacts WHERE client_id = ?", client_id).await
    }

    async fn vendor_staff(&self, vendor_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        self.fetch_ids("SELECT user_id FROM vendor_staff WHERE vendor_id = ?", (vendor_id,)).await
    }

    async fn admins(&self) -> anyhow::Result<Vec<Uuid>> {
        self.fetch_ids("SELECT user_id FROM admins", ()).await
    }
}
