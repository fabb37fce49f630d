//! Buyer registration of identity information against a serial number

use std::sync::Arc;

use serial_registry::{ClaimOutcome, SerialStore};
use tagpage_common::{
    dial_reference, sanitize_text_field, sanitize_textarea_field, Error, Nonces, RequestContext,
    Result,
};
use tracing::{info, warn};

use crate::media::{validate_image, MediaStore, UploadedImage};
use crate::orders::{ItemRegistration, OrderStore};
use crate::publisher::{PageContent, PageOrigin, Publisher};

/// Order id the manual form submits in place of a real order
pub const MANUAL_ORDER_ID: u64 = 999_999;

/// Token action for registration forms, scoped to the line item id
pub const REGISTER_ACTION: &str = "register_serial";

/// Notice shown after an order-bound registration succeeds
pub const SUCCESS_NOTICE: &str = "Your registration page has been created successfully!";

/// What a registration is made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationTarget {
    /// A line item of a real order owned by the requester
    OrderBound { order_id: u64, item_id: u64 },

    /// Operator testing without an order; uses a fixed product
    ManualTest { product_id: u64 },
}

impl RegistrationTarget {
    /// Interpret the order and item ids posted by the form
    pub fn from_wire(order_id: u64, item_id: u64, manual_product_id: u64) -> Self {
        if order_id == MANUAL_ORDER_ID {
            RegistrationTarget::ManualTest {
                product_id: manual_product_id,
            }
        } else {
            RegistrationTarget::OrderBound { order_id, item_id }
        }
    }
}

/// Raw values submitted with the registration form
#[derive(Debug, Clone)]
pub struct RegistrationSubmission {
    pub target: RegistrationTarget,
    pub serial: String,
    pub name: String,
    pub phone: String,
    pub vital_info: String,
    pub image: Option<UploadedImage>,
    pub token: Option<String>,
}

/// Outcome of a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub target: RegistrationTarget,
    pub serial_number: String,
    pub page_id: u64,
    pub page_url: String,

    /// The serial was not in the registry and has been created
    pub created_serial: bool,
}

/// Sanitized form fields
struct Fields {
    serial: String,
    name: String,
    phone: String,
    vital_info: String,
}

impl Fields {
    fn sanitize(submission: &RegistrationSubmission) -> Result<Self> {
        let fields = Self {
            serial: sanitize_text_field(&submission.serial),
            name: sanitize_text_field(&submission.name),
            phone: sanitize_text_field(&submission.phone),
            vital_info: sanitize_textarea_field(&submission.vital_info),
        };

        for (label, value) in [
            ("serial number", &fields.serial),
            ("name", &fields.name),
            ("phone", &fields.phone),
            ("vital info", &fields.vital_info),
        ] {
            if value.is_empty() {
                return Err(Error::Validation(label.to_string()));
            }
        }
        Ok(fields)
    }
}

/// Resolved target of an authorized request
struct Authorized {
    product_id: u64,
    owner_user_id: u64,
    order: Option<(u64, u64, ItemRegistration)>,
}

/// Handles registration submissions
#[derive(Clone)]
pub struct Registrar {
    serials: Arc<dyn SerialStore>,
    orders: Arc<dyn OrderStore>,
    media: Arc<dyn MediaStore>,
    publisher: Publisher,
    nonces: Nonces,
    manual_test_mode: bool,
}

impl Registrar {
    pub fn new(
        serials: Arc<dyn SerialStore>,
        orders: Arc<dyn OrderStore>,
        media: Arc<dyn MediaStore>,
        publisher: Publisher,
        nonces: Nonces,
        manual_test_mode: bool,
    ) -> Self {
        Self {
            serials,
            orders,
            media,
            publisher,
            nonces,
            manual_test_mode,
        }
    }

    /// Token to embed in the form of one line item
    pub fn issue_token(&self, item_id: u64, user_id: u64) -> String {
        self.nonces
            .issue(REGISTER_ACTION, &item_id.to_string(), user_id)
    }

    /// Register the submitted identity information against a serial number
    /// and publish its page.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        submission: RegistrationSubmission,
    ) -> Result<Registered> {
        let authorized = self.authorize(ctx, &submission).await?;
        let fields = Fields::sanitize(&submission)?;

        if let Some(image) = &submission.image {
            validate_image(image)?;
        }

        let created_serial = match self.serials.claim(&fields.serial, authorized.product_id).await? {
            ClaimOutcome::AlreadyUsed(_) => {
                info!("Serial {} is already registered", fields.serial);
                return Err(Error::SerialAlreadyRegistered(fields.serial));
            }
            ClaimOutcome::Claimed(_) => false,
            ClaimOutcome::Created(_) => {
                info!(
                    "Serial {} was unknown, created for product {}",
                    fields.serial, authorized.product_id
                );
                true
            }
        };

        let previous_image = authorized
            .order
            .as_ref()
            .and_then(|(_, _, reg)| reg.customer_image.clone());
        let image_key = match &submission.image {
            Some(image) => Some(self.media.store(image).await?),
            None => previous_image,
        };

        let content = PageContent {
            display_name: fields.name.clone(),
            image_url: image_key.as_deref().and_then(|key| self.media.url(key)),
            free_text: fields.vital_info.clone(),
            dial_ref: dial_reference(&fields.phone),
            serial_number: fields.serial.clone(),
        };

        let origin = match submission.target {
            RegistrationTarget::OrderBound { order_id, item_id } => PageOrigin {
                order_id: Some(order_id),
                item_id: Some(item_id),
            },
            RegistrationTarget::ManualTest { .. } => PageOrigin::default(),
        };
        let published = self
            .publisher
            .publish(&content, authorized.owner_user_id, origin)
            .await?;

        if let Some((order_id, item_id, _)) = authorized.order {
            let registration = ItemRegistration {
                customer_name: Some(fields.name),
                phone_number: Some(fields.phone),
                vital_information: Some(fields.vital_info),
                customer_image: image_key,
                serial_number: Some(fields.serial.clone()),
            };
            self.orders
                .save_registration(order_id, item_id, &registration)
                .await?;
            self.orders
                .set_activation_page(order_id, item_id, published.page_id)
                .await?;
        }

        info!(
            "Registered serial {} (page {})",
            fields.serial, published.page_id
        );

        Ok(Registered {
            target: submission.target,
            serial_number: fields.serial,
            page_id: published.page_id,
            page_url: published.url,
            created_serial,
        })
    }

    async fn authorize(
        &self,
        ctx: &RequestContext,
        submission: &RegistrationSubmission,
    ) -> Result<Authorized> {
        match submission.target {
            RegistrationTarget::ManualTest { product_id } => {
                if !self.manual_test_mode {
                    return Err(Error::Authorization(
                        "manual registration is disabled".to_string(),
                    ));
                }
                warn!(
                    "Manual test registration of serial {:?} by user {:?}",
                    submission.serial, ctx.user_id
                );
                Ok(Authorized {
                    product_id,
                    owner_user_id: ctx.acting_user(),
                    order: None,
                })
            }
            RegistrationTarget::OrderBound { order_id, item_id } => {
                let user_id = ctx.require_user()?;

                let token = submission.token.as_deref().unwrap_or_default();
                if !self
                    .nonces
                    .verify(token, REGISTER_ACTION, &item_id.to_string(), user_id)
                {
                    return Err(Error::Authorization(format!(
                        "invalid token for item {}",
                        item_id
                    )));
                }

                let order = self
                    .orders
                    .get(order_id)
                    .await?
                    .filter(|order| order.user_id == user_id)
                    .ok_or_else(|| {
                        Error::Authorization(format!(
                            "order {} does not belong to user {}",
                            order_id, user_id
                        ))
                    })?;
                let item = order.item(item_id).ok_or_else(|| {
                    Error::Authorization(format!("item {} is not part of order {}", item_id, order_id))
                })?;

                Ok(Authorized {
                    product_id: item.product_id,
                    owner_user_id: user_id,
                    order: Some((order_id, item_id, item.registration.clone())),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FileMediaStore;
    use crate::orders::{MemoryOrderStore, Order, OrderItem, OrderStatus};
    use crate::pages::{MemoryPageStore, PageStore};
    use serial_registry::MemorySerialStore;
    use std::collections::BTreeMap;

    struct Fixture {
        serials: Arc<MemorySerialStore>,
        orders: Arc<MemoryOrderStore>,
        pages: Arc<MemoryPageStore>,
        registrar: Registrar,
        _media_dir: tempfile::TempDir,
    }

    fn fixture(manual_test_mode: bool) -> Fixture {
        let media_dir = tempfile::tempdir().unwrap();
        let serials = Arc::new(MemorySerialStore::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let pages = Arc::new(MemoryPageStore::new());
        let media = Arc::new(FileMediaStore::open(media_dir.path(), "http://localhost").unwrap());

        let registrar = Registrar::new(
            serials.clone(),
            orders.clone(),
            media,
            Publisher::new(pages.clone(), "http://localhost"),
            Nonces::new("registration-test-secret"),
            manual_test_mode,
        );

        Fixture {
            serials,
            orders,
            pages,
            registrar,
            _media_dir: media_dir,
        }
    }

    async fn seed_order(f: &Fixture) {
        f.orders
            .upsert(&Order {
                id: 1001,
                user_id: 5,
                status: OrderStatus::Completed,
                items: vec![OrderItem {
                    item_id: 1,
                    product_id: 42,
                    product_name: "Pet Tag".to_string(),
                    registration: ItemRegistration::default(),
                }],
                activation_pages: BTreeMap::new(),
            })
            .await
            .unwrap();
    }

    fn submission(target: RegistrationTarget, serial: &str) -> RegistrationSubmission {
        RegistrationSubmission {
            target,
            serial: serial.to_string(),
            name: "Jane <b>Doe</b>".to_string(),
            phone: "555-123-4567".to_string(),
            vital_info: "Allergic to bees".to_string(),
            image: None,
            token: None,
        }
    }

    fn png() -> UploadedImage {
        UploadedImage {
            file_name: "jane.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: b"\x89PNG".to_vec(),
        }
    }

    const ORDER_ITEM: RegistrationTarget = RegistrationTarget::OrderBound {
        order_id: 1001,
        item_id: 1,
    };

    #[test]
    fn test_target_from_wire() {
        assert_eq!(
            RegistrationTarget::from_wire(999_999, 0, 35),
            RegistrationTarget::ManualTest { product_id: 35 }
        );
        assert_eq!(RegistrationTarget::from_wire(1001, 1, 35), ORDER_ITEM);
    }

    #[tokio::test]
    async fn test_order_bound_registration() {
        let f = fixture(false);
        seed_order(&f).await;
        f.serials.insert("SN-100", 42, false).await.unwrap();

        let mut sub = submission(ORDER_ITEM, " SN-100 ");
        sub.token = Some(f.registrar.issue_token(1, 5));
        sub.image = Some(png());

        let registered = f
            .registrar
            .register(&RequestContext::customer(5), sub)
            .await
            .unwrap();

        assert_eq!(registered.serial_number, "SN-100");
        assert!(!registered.created_serial);
        assert!(f.serials.find_by_serial("SN-100").await.unwrap().unwrap().used);

        let page = f.pages.get(registered.page_id).await.unwrap().unwrap();
        assert!(page.body.contains("<h1>Jane Doe</h1>"));
        assert!(page.body.contains("<img src=\"http://localhost/media/uploads/"));
        assert_eq!(page.metadata.order_id, Some(1001));

        let order = f.orders.get(1001).await.unwrap().unwrap();
        let reg = &order.items[0].registration;
        assert_eq!(reg.serial_number.as_deref(), Some("SN-100"));
        assert_eq!(reg.customer_name.as_deref(), Some("Jane Doe"));
        assert!(reg.customer_image.is_some());
        assert_eq!(order.activation_pages.get(&1), Some(&registered.page_id));
    }

    #[tokio::test]
    async fn test_manual_registration_creates_unknown_serial() {
        let f = fixture(true);
        let target = RegistrationTarget::from_wire(MANUAL_ORDER_ID, 0, 35);

        let registered = f
            .registrar
            .register(&RequestContext::anonymous(), submission(target, "SN-NEW"))
            .await
            .unwrap();

        assert!(registered.created_serial);
        assert_eq!(registered.page_url, "http://localhost/pages/1");

        let record = f.serials.find_by_serial("SN-NEW").await.unwrap().unwrap();
        assert_eq!(record.item_no, 35);
        assert!(record.used);
    }

    #[tokio::test]
    async fn test_manual_registration_disabled() {
        let f = fixture(false);
        let target = RegistrationTarget::ManualTest { product_id: 35 };

        let result = f
            .registrar
            .register(&RequestContext::anonymous(), submission(target, "SN-NEW"))
            .await;

        assert!(matches!(result, Err(Error::Authorization(_))));
        assert!(f.serials.find_by_serial("SN-NEW").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_already_used_serial_is_rejected() {
        let f = fixture(true);
        f.serials.insert("SN-7", 35, true).await.unwrap();

        let result = f
            .registrar
            .register(
                &RequestContext::anonymous(),
                submission(RegistrationTarget::ManualTest { product_id: 35 }, "SN-7"),
            )
            .await;

        assert!(matches!(result, Err(Error::SerialAlreadyRegistered(_))));
        assert_eq!(f.pages.count().await, 0);
    }

    #[tokio::test]
    async fn test_html_upload_rejected_before_claim() {
        let f = fixture(true);
        f.serials.insert("SN-8", 35, false).await.unwrap();

        let mut sub = submission(RegistrationTarget::ManualTest { product_id: 35 }, "SN-8");
        sub.image = Some(UploadedImage {
            file_name: "evil.html".to_string(),
            content_type: "text/html".to_string(),
            bytes: b"<html>".to_vec(),
        });

        let result = f.registrar.register(&RequestContext::anonymous(), sub).await;

        assert!(matches!(result, Err(Error::UnsupportedImageType(_))));
        assert!(!f.serials.find_by_serial("SN-8").await.unwrap().unwrap().used);
        assert_eq!(f.pages.count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_upload_rejected_before_claim() {
        let f = fixture(true);
        f.serials.insert("SN-E", 35, false).await.unwrap();

        let mut sub = submission(RegistrationTarget::ManualTest { product_id: 35 }, "SN-E");
        sub.image = Some(UploadedImage {
            file_name: "empty.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: Vec::new(),
        });

        let result = f.registrar.register(&RequestContext::anonymous(), sub).await;
        assert!(matches!(result, Err(Error::UploadFailed(_))));
        assert!(!f.serials.find_by_serial("SN-E").await.unwrap().unwrap().used);
        assert_eq!(f.pages.count().await, 0);

        // the serial is still available for a corrected submission
        let retry = submission(RegistrationTarget::ManualTest { product_id: 35 }, "SN-E");
        let registered = f
            .registrar
            .register(&RequestContext::anonymous(), retry)
            .await
            .unwrap();
        assert!(!registered.created_serial);
    }

    #[tokio::test]
    async fn test_missing_field_is_validation_error() {
        let f = fixture(true);
        let mut sub = submission(RegistrationTarget::ManualTest { product_id: 35 }, "SN-9");
        sub.name = "<script>alert(1)</script>".to_string();

        let result = f.registrar.register(&RequestContext::anonymous(), sub).await;

        match result {
            Err(Error::Validation(field)) => assert_eq!(field, "name"),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(f.serials.find_by_serial("SN-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_order_bound_requires_owner_and_token() {
        let f = fixture(false);
        seed_order(&f).await;

        // missing token
        let result = f
            .registrar
            .register(&RequestContext::customer(5), submission(ORDER_ITEM, "SN-1"))
            .await;
        assert!(matches!(result, Err(Error::Authorization(_))));

        // someone else's order
        let mut sub = submission(ORDER_ITEM, "SN-1");
        sub.token = Some(f.registrar.issue_token(1, 6));
        let result = f.registrar.register(&RequestContext::customer(6), sub).await;
        assert!(matches!(result, Err(Error::Authorization(_))));

        // anonymous
        let result = f
            .registrar
            .register(&RequestContext::anonymous(), submission(ORDER_ITEM, "SN-1"))
            .await;
        assert!(matches!(result, Err(Error::Authorization(_))));

        assert!(f.serials.find_by_serial("SN-1").await.unwrap().is_none());
    }
}
