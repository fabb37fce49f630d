//! Orders as delivered by the shop's order webhook
//!
//! Redis data model:
//! - `order:{id}` → JSON document of the order, including registration data
//!   written back by this service

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tagpage_common::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

/// Identity information registered against a line item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vital_information: Option<String>,

    /// Media key of the uploaded customer image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

/// One product line of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: u64,
    pub product_id: u64,

    #[serde(default)]
    pub product_name: String,

    #[serde(default)]
    pub registration: ItemRegistration,
}

/// A customer order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,

    /// Customer who placed the order
    pub user_id: u64,

    pub status: OrderStatus,

    #[serde(default)]
    pub items: Vec<OrderItem>,

    /// Published page per line item
    #[serde(default)]
    pub activation_pages: BTreeMap<u64, u64>,
}

impl Order {
    pub fn item(&self, item_id: u64) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn item_mut(&mut self, item_id: u64) -> Option<&mut OrderItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id)
    }

    /// Carry over what this service wrote onto a previously stored copy.
    ///
    /// The shop owns items and status; activation pages and any registration
    /// field the incoming copy lacks come from `existing`.
    pub fn merge_from(&mut self, existing: &Order) {
        for (item_id, page_id) in &existing.activation_pages {
            self.activation_pages.entry(*item_id).or_insert(*page_id);
        }

        for item in &mut self.items {
            let Some(old) = existing.item(item.item_id) else {
                continue;
            };
            let reg = &mut item.registration;
            let old = &old.registration;
            reg.customer_name = reg.customer_name.take().or_else(|| old.customer_name.clone());
            reg.phone_number = reg.phone_number.take().or_else(|| old.phone_number.clone());
            reg.vital_information = reg
                .vital_information
                .take()
                .or_else(|| old.vital_information.clone());
            reg.customer_image = reg.customer_image.take().or_else(|| old.customer_image.clone());
            reg.serial_number = reg.serial_number.take().or_else(|| old.serial_number.clone());
        }
    }
}

fn order_not_found(order_id: u64) -> Error {
    Error::NotFound(format!("Order {}", order_id))
}

fn item_not_found(order_id: u64, item_id: u64) -> Error {
    Error::NotFound(format!("Item {} of order {}", item_id, order_id))
}

/// Order storage shared with the shop
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: u64) -> Result<Option<Order>>;

    /// Store an order received from the shop, keeping data this service wrote earlier
    async fn upsert(&self, order: &Order) -> Result<Order>;

    /// Persist registration fields onto a line item
    async fn save_registration(
        &self,
        order_id: u64,
        item_id: u64,
        registration: &ItemRegistration,
    ) -> Result<()>;

    /// Record the page published for a line item
    async fn set_activation_page(&self, order_id: u64, item_id: u64, page_id: u64) -> Result<()>;
}

/// Writes the new document only if the stored one is still the one read
const COMPARE_AND_SET_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if (current or '') ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

/// Attempts before a contended update gives up
const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Redis-backed order storage
pub struct RedisOrderStore {
    conn: ConnectionManager,
    compare_and_set: Script,
}

impl RedisOrderStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            compare_and_set: Script::new(COMPARE_AND_SET_SCRIPT),
        }
    }

    fn key(order_id: u64) -> String {
        format!("order:{}", order_id)
    }

    async fn read_raw(&self, order_id: u64) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(Self::key(order_id))
            .await
            .map_err(|e| Error::Redis(e.to_string()))
    }

    /// Read-modify-write of one order document.
    ///
    /// The write is rejected by the script when another writer got in between,
    /// in which case the document is read again and `apply` re-run.
    async fn update<F>(&self, order_id: u64, mut apply: F) -> Result<Order>
    where
        F: FnMut(Option<Order>) -> Result<Order> + Send,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let raw = self.read_raw(order_id).await?;
            let current = match &raw {
                Some(data) => Some(serde_json::from_str::<Order>(data)?),
                None => None,
            };

            let updated = apply(current)?;
            let json = serde_json::to_string(&updated)?;

            let mut conn = self.conn.clone();
            let written: i64 = self
                .compare_and_set
                .key(Self::key(order_id))
                .arg(raw.as_deref().unwrap_or_default())
                .arg(json)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| Error::Redis(e.to_string()))?;

            if written == 1 {
                return Ok(updated);
            }
            debug!("Order {} changed concurrently (attempt {})", order_id, attempt);
        }

        warn!("Giving up on contended update of order {}", order_id);
        Err(Error::Redis(format!(
            "order {} is being updated concurrently",
            order_id
        )))
    }
}

#[async_trait]
impl OrderStore for RedisOrderStore {
    async fn get(&self, order_id: u64) -> Result<Option<Order>> {
        match self.read_raw(order_id).await? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, order: &Order) -> Result<Order> {
        let merged = self
            .update(order.id, |existing| {
                let mut merged = order.clone();
                if let Some(existing) = existing {
                    merged.merge_from(&existing);
                }
                Ok(merged)
            })
            .await?;

        info!("Stored order {} ({:?})", merged.id, merged.status);
        Ok(merged)
    }

    async fn save_registration(
        &self,
        order_id: u64,
        item_id: u64,
        registration: &ItemRegistration,
    ) -> Result<()> {
        self.update(order_id, |existing| {
            let mut order = existing.ok_or_else(|| order_not_found(order_id))?;
            let item = order
                .item_mut(item_id)
                .ok_or_else(|| item_not_found(order_id, item_id))?;
            item.registration = registration.clone();
            Ok(order)
        })
        .await?;

        debug!("Saved registration for order {} item {}", order_id, item_id);
        Ok(())
    }

    async fn set_activation_page(&self, order_id: u64, item_id: u64, page_id: u64) -> Result<()> {
        self.update(order_id, |existing| {
            let mut order = existing.ok_or_else(|| order_not_found(order_id))?;
            order.activation_pages.insert(item_id, page_id);
            Ok(order)
        })
        .await?;
        Ok(())
    }
}

/// In-process order storage for tests and local runs
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<u64, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, order_id: u64) -> Result<Option<Order>> {
        Ok(self.orders.lock().await.get(&order_id).cloned())
    }

    async fn upsert(&self, order: &Order) -> Result<Order> {
        let mut orders = self.orders.lock().await;
        let mut merged = order.clone();
        if let Some(existing) = orders.get(&order.id) {
            merged.merge_from(existing);
        }
        orders.insert(merged.id, merged.clone());
        Ok(merged)
    }

    async fn save_registration(
        &self,
        order_id: u64,
        item_id: u64,
        registration: &ItemRegistration,
    ) -> Result<()> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        let item = order
            .item_mut(item_id)
            .ok_or_else(|| item_not_found(order_id, item_id))?;
        item.registration = registration.clone();
        Ok(())
    }

    async fn set_activation_page(&self, order_id: u64, item_id: u64, page_id: u64) -> Result<()> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        order.activation_pages.insert(item_id, page_id);
        Ok(())
    }
}
