use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::order::{ClientContact, FeeRule};
use super::{Cart, CartService, PriceHistory, UserDirectory, VendorDirectory, VendorProfile};

#[derive(Default)]
struct Directory {
    carts: HashMap<Uuid, Cart>,
    vendors: HashMap<Uuid, VendorProfile>,
    fee_rules: Vec<FeeRule>,
    price_records: HashMap<(Uuid, Option<Uuid>), Uuid>,
    clients: HashMap<Uuid, ClientContact>,
    staff: HashMap<Uuid, Vec<Uuid>>,
    admins: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SeedPriceRecord {
    pub product_id: Uuid,
    #[serde(default)]
    pub variation_id: Option<Uuid>,
    pub record_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SeedClient {
    pub id: Uuid,
    #[serde(flatten)]
    pub contact: ClientContact,
}

#[derive(Debug, Deserialize)]
pub struct SeedStaff {
    pub vendor_id: Uuid,
    pub user_id: Uuid,
}

/// JSON fixture loaded into the `memory` storage mode at startup
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectorySeed {
    pub vendors: Vec<VendorProfile>,
    pub fee_rules: Vec<FeeRule>,
    pub price_records: Vec<SeedPriceRecord>,
    pub clients: Vec<SeedClient>,
    pub staff: Vec<SeedStaff>,
    pub admins: Vec<Uuid>,
    pub carts: Vec<Cart>,
}

/// In-memory implementation of every collaborator trait.
///
/// Backs the `memory` storage mode and the tests. `fail_next_cart_clears`
/// makes the next N `clear_cart` calls fail so the compensation path can be
/// driven deterministically.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<RwLock<Directory>>,
    failing_clears: Arc<AtomicU32>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        for vendor in seed.vendors {
            directory.put_vendor(vendor).await;
        }
        for rule in seed.fee_rules {
            directory.put_fee_rule(rule).await;
        }
        for record in seed.price_records {
            directory.put_price_record(record.product_id, record.variation_id, record.record_id).await;
        }
        for client in seed.clients {
            directory.put_client(client.id, client.contact).await;
        }
        for member in seed.staff {
            directory.put_staff(member.vendor_id, member.user_id).await;
        }
        for admin in seed.admins {
            directory.put_admin(admin).await;
        }
        for cart in seed.carts {
            directory.put_cart(cart).await;
        }
        directory
    }

    pub async fn load_seed_file(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let seed: DirectorySeed = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            vendors = seed.vendors.len(),
            clients = seed.clients.len(),
            carts = seed.carts.len(),
            "🌱 Seeding in-memory directory"
        );
        Ok(Self::from_seed(seed).await)
    }

    pub async fn put_cart(&self, cart: Cart) {
        self.inner.write().await.carts.insert(cart.client_id, cart);
    }

    pub async fn put_vendor(&self, vendor: VendorProfile) {
        self.inner.write().await.vendors.insert(vendor.id, vendor);
    }

    pub async fn put_fee_rule(&self, rule: FeeRule) {
        self.inner.write().await.fee_rules.push(rule);
    }

    pub async fn put_price_record(&self, product_id: Uuid, variation_id: Option<Uuid>, record_id: Uuid) {
        self.inner
            .write()
            .await
            .price_records
            .insert((product_id, variation_id), record_id);
    }

    pub async fn put_client(&self, client_id: Uuid, contact: ClientContact) {
        self.inner.write().await.clients.insert(client_id, contact);
    }

    pub async fn put_staff(&self, vendor_id: Uuid, user_id: Uuid) {
        self.inner.write().await.staff.entry(vendor_id).or_default().push(user_id);
    }

    pub async fn put_admin(&self, user_id: Uuid) {
        self.inner.write().await.admins.push(user_id);
    }

    #[cfg(test)]
    pub fn fail_next_cart_clears(&self, count: u32) {
        self.failing_clears.store(count, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub async fn has_cart(&self, client_id: Uuid) -> bool {
        self.inner.read().await.carts.contains_key(&client_id)
    }
}

#[async_trait]
impl CartService for InMemoryDirectory {
    async fn load_cart(&self, client_id: Uuid) -> anyhow::Result<Option<Cart>> {
        Ok(self.inner.read().await.carts.get(&client_id).cloned())
    }

    async fn clear_cart(&self, client_id: Uuid) -> anyhow::Result<()> {
        let failing = self
            .failing_clears
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("cart store unavailable");
        }

        self.inner.write().await.carts.remove(&client_id);
        Ok(())
    }
}

#[async_trait]
impl VendorDirectory for InMemoryDirectory {
    async fn vendor(&self, vendor_id: Uuid) -> anyhow::Result<Option<VendorProfile>> {
        Ok(self.inner.read().await.vendors.get(&vendor_id).cloned())
    }

    async fn fee_rules(&self, vendor_id: Option<Uuid>) -> anyhow::Result<Vec<FeeRule>> {
        let inner = self.inner.read().await;
        Ok(inner
            .fee_rules
            .iter()
            .filter(|rule| rule.vendor_id == vendor_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PriceHistory for InMemoryDirectory {
    async fn active_price_record(
        &self,
        product_id: Uuid,
        variation_id: Option<Uuid>,
    ) -> anyhow::Result<Option<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .price_records
            .get(&(product_id, variation_id))
            .copied())
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn client_contact(&self, client_id: Uuid) -> anyhow::Result<Option<ClientContact>> {
        Ok(self.inner.read().await.clients.get(&client_id).cloned())
    }

    async fn vendor_staff(&self, vendor_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        Ok(self.inner.read().await.staff.get(&vendor_id).cloned().unwrap_or_default())
    }

    async fn admins(&self) -> anyhow::Result<Vec<Uuid>> {
        Ok(self.inner.read().await.admins.clone())
    }
}
