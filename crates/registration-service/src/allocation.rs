//! Serial allocation for completed orders

use std::sync::Arc;

use serde::Serialize;
use serial_registry::SerialStore;
use tagpage_common::{dial_reference, Result};
use tracing::{info, warn};

use crate::media::MediaStore;
use crate::orders::{Order, OrderStatus, OrderStore};
use crate::publisher::{PageContent, PageOrigin, Publisher};

/// A line item that received a serial
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatedItem {
    pub item_id: u64,
    pub serial_number: String,
    pub page_id: u64,
    pub page_url: String,
}

/// What happened to each line item of an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    pub order_id: u64,
    pub allocated: Vec<AllocatedItem>,

    /// Items whose product had no unused serial left
    pub skipped: Vec<u64>,

    /// Items that already had a page from an earlier delivery
    pub already_allocated: Vec<u64>,
}

/// Assigns serials to the line items of completed orders
#[derive(Clone)]
pub struct AllocationTrigger {
    serials: Arc<dyn SerialStore>,
    orders: Arc<dyn OrderStore>,
    media: Arc<dyn MediaStore>,
    publisher: Publisher,
}

impl AllocationTrigger {
    pub fn new(
        serials: Arc<dyn SerialStore>,
        orders: Arc<dyn OrderStore>,
        media: Arc<dyn MediaStore>,
        publisher: Publisher,
    ) -> Self {
        Self {
            serials,
            orders,
            media,
            publisher,
        }
    }

    /// Allocate serials for every line item of a completed order.
    ///
    /// Items whose product has no unused serial are skipped without error.
    pub async fn on_order_completed(&self, order: &Order) -> Result<AllocationReport> {
        let mut report = AllocationReport {
            order_id: order.id,
            ..Default::default()
        };

        if order.status != OrderStatus::Completed {
            info!("Order {} is {:?}, nothing to allocate", order.id, order.status);
            return Ok(report);
        }

        for item in &order.items {
            if order.activation_pages.contains_key(&item.item_id) {
                info!(
                    "Order {} item {} already has a page, skipping",
                    order.id, item.item_id
                );
                report.already_allocated.push(item.item_id);
                continue;
            }

            let Some(record) = self.serials.claim_next_unused(item.product_id).await? else {
                warn!(
                    "No unused serial for product {} (order {} item {})",
                    item.product_id, order.id, item.item_id
                );
                report.skipped.push(item.item_id);
                continue;
            };

            let mut registration = item.registration.clone();
            let content = PageContent {
                display_name: registration.customer_name.clone().unwrap_or_default(),
                image_url: registration
                    .customer_image
                    .as_deref()
                    .and_then(|key| self.media.url(key)),
                free_text: registration.vital_information.clone().unwrap_or_default(),
                dial_ref: dial_reference(registration.phone_number.as_deref().unwrap_or_default()),
                serial_number: record.serial_number.clone(),
            };

            let published = self
                .publisher
                .publish(
                    &content,
                    order.user_id,
                    PageOrigin {
                        order_id: Some(order.id),
                        item_id: Some(item.item_id),
                    },
                )
                .await?;

            registration.serial_number = Some(record.serial_number.clone());
            self.orders
                .save_registration(order.id, item.item_id, &registration)
                .await?;
            self.orders
                .set_activation_page(order.id, item.item_id, published.page_id)
                .await?;

            info!(
                "Allocated serial {} to order {} item {} (page {})",
                record.serial_number, order.id, item.item_id, published.page_id
            );

            report.allocated.push(AllocatedItem {
                item_id: item.item_id,
                serial_number: record.serial_number,
                page_id: published.page_id,
                page_url: published.url,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FileMediaStore;
    use crate::orders::{ItemRegistration, MemoryOrderStore, OrderItem};
    use crate::pages::{MemoryPageStore, PageStore};
    use serial_registry::MemorySerialStore;
    use std::collections::BTreeMap;

    struct Fixture {
        serials: Arc<MemorySerialStore>,
        orders: Arc<MemoryOrderStore>,
        pages: Arc<MemoryPageStore>,
        trigger: AllocationTrigger,
        _media_dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let media_dir = tempfile::tempdir().unwrap();
        let serials = Arc::new(MemorySerialStore::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let pages = Arc::new(MemoryPageStore::new());
        let media = Arc::new(FileMediaStore::open(media_dir.path(), "http://localhost").unwrap());
        let publisher = Publisher::new(pages.clone(), "http://localhost");

        Fixture {
            trigger: AllocationTrigger::new(serials.clone(), orders.clone(), media, publisher),
            serials,
            orders,
            pages,
            _media_dir: media_dir,
        }
    }

    fn order(id: u64, product_id: u64) -> Order {
        Order {
            id,
            user_id: 5,
            status: OrderStatus::Completed,
            items: vec![OrderItem {
                item_id: 1,
                product_id,
                product_name: "Pet Tag".to_string(),
                registration: ItemRegistration {
                    customer_name: Some("Jane Doe".to_string()),
                    phone_number: Some("555-123-4567".to_string()),
                    vital_information: Some("Allergic to bees".to_string()),
                    ..Default::default()
                },
            }],
            activation_pages: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_completed_order_gets_serial_and_page() {
        let f = fixture();
        f.serials.insert("SN-100", 42, false).await.unwrap();

        let first = order(1001, 42);
        f.orders.upsert(&first).await.unwrap();
        let report = f.trigger.on_order_completed(&first).await.unwrap();

        assert_eq!(report.allocated.len(), 1);
        assert_eq!(report.allocated[0].serial_number, "SN-100");
        assert!(f.serials.find_by_serial("SN-100").await.unwrap().unwrap().used);

        let page = f
            .pages
            .get(report.allocated[0].page_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.title, "SN-100");
        assert!(page.body.contains("Jane Doe"));
        assert!(page.body.contains("tel:+15551234567"));
        assert_eq!(page.owner_user_id, 5);

        let stored = f.orders.get(1001).await.unwrap().unwrap();
        assert_eq!(stored.activation_pages.get(&1), Some(&page.id));
        assert_eq!(
            stored.items[0].registration.serial_number.as_deref(),
            Some("SN-100")
        );

        // second order for the same product finds the pool empty
        let second = order(1002, 42);
        f.orders.upsert(&second).await.unwrap();
        let report = f.trigger.on_order_completed(&second).await.unwrap();

        assert!(report.allocated.is_empty());
        assert_eq!(report.skipped, vec![1]);
        assert_eq!(f.pages.count().await, 1);
    }

    #[tokio::test]
    async fn test_redelivered_order_is_not_allocated_twice() {
        let f = fixture();
        f.serials.insert("SN-1", 42, false).await.unwrap();
        f.serials.insert("SN-2", 42, false).await.unwrap();

        f.orders.upsert(&order(1001, 42)).await.unwrap();
        let first = f.orders.get(1001).await.unwrap().unwrap();
        f.trigger.on_order_completed(&first).await.unwrap();

        let redelivered = f.orders.upsert(&order(1001, 42)).await.unwrap();
        let report = f.trigger.on_order_completed(&redelivered).await.unwrap();

        assert!(report.allocated.is_empty());
        assert_eq!(report.already_allocated, vec![1]);
        assert!(!f.serials.find_by_serial("SN-2").await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_pending_order_is_ignored() {
        let f = fixture();
        f.serials.insert("SN-1", 42, false).await.unwrap();

        let mut pending = order(1001, 42);
        pending.status = OrderStatus::Processing;
        let report = f.trigger.on_order_completed(&pending).await.unwrap();

        assert!(report.allocated.is_empty());
        assert!(!f.serials.find_by_serial("SN-1").await.unwrap().unwrap().used);
    }
}
