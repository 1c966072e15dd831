// ============================================================================
// External Collaborators
// ============================================================================
//
// Services the order flow depends on but does not own: carts, the vendor
// directory with its fee schedules, price history and the user directory.
// Each is a trait so the backends can be swapped (in-memory for tests and
// the `memory` storage mode, ScyllaDB documents otherwise).
//
// ============================================================================

mod memory;
mod scylla_store;

pub use memory::InMemoryDirectory;
pub use scylla_store::ScyllaDirectory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{ClientContact, FeeRule};

/// Finalized cart line handed over at checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub product_name: String,
    pub image: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub promotion_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub client_id: Uuid,
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub id: Uuid,
    pub name: String,
    pub offers_direct_delivery: bool,
    pub allows_same_day: bool,
}

#[async_trait]
pub trait CartService: Send + Sync {
    async fn load_cart(&self, client_id: Uuid) -> anyhow::Result<Option<Cart>>;

    /// Hard delete of the client's cart
    async fn clear_cart(&self, client_id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait VendorDirectory: Send + Sync {
    async fn vendor(&self, vendor_id: Uuid) -> anyhow::Result<Option<VendorProfile>>;

    /// Fee rules owned by `vendor_id`, or the platform rules when `None`
    async fn fee_rules(&self, vendor_id: Option<Uuid>) -> anyhow::Result<Vec<FeeRule>>;
}

#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Id of the price record in force for a product variation
    async fn active_price_record(
        &self,
        product_id: Uuid,
        variation_id: Option<Uuid>,
    ) -> anyhow::Result<Option<Uuid>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn client_contact(&self, client_id: Uuid) -> anyhow::Result<Option<ClientContact>>;

    async fn vendor_staff(&self, vendor_id: Uuid) -> anyhow::Result<Vec<Uuid>>;

    async fn admins(&self) -> anyhow::Result<Vec<Uuid>>;
}
