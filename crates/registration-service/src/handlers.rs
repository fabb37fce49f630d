//! HTTP handlers for the registration service

use axum::{
    body::Bytes,
    extract::{multipart::Field, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serial_registry::SerialStore;
use std::sync::Arc;
use tagpage_common::{escape_html, Error, Nonces, RequestContext};
use tracing::{error, info, warn};

use crate::{
    allocation::{AllocationReport, AllocationTrigger},
    form::{self, ItemForm, SUBMIT_MARKER},
    media::{MediaStore, UploadedImage},
    notices::{Notice, NoticeStore},
    orders::{Order, OrderStore},
    pages::PageStore,
    publisher::{render_document, Publisher},
    registration::{Registrar, RegistrationSubmission, RegistrationTarget, SUCCESS_NOTICE},
    webhook, Settings,
};

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub serials: Arc<dyn SerialStore>,
    pub orders: Arc<dyn OrderStore>,
    pub pages: Arc<dyn PageStore>,
    pub media: Arc<dyn MediaStore>,
    pub notices: Arc<dyn NoticeStore>,
    pub publisher: Publisher,
    pub registrar: Registrar,
    pub allocation: AllocationTrigger,
}

impl AppState {
    /// Wire the stores into the publisher, registrar and allocation trigger
    pub fn new(
        settings: Settings,
        nonces: Nonces,
        serials: Arc<dyn SerialStore>,
        orders: Arc<dyn OrderStore>,
        pages: Arc<dyn PageStore>,
        media: Arc<dyn MediaStore>,
        notices: Arc<dyn NoticeStore>,
    ) -> Self {
        let publisher = Publisher::new(pages.clone(), &settings.public_base_url);
        let registrar = Registrar::new(
            serials.clone(),
            orders.clone(),
            media.clone(),
            publisher.clone(),
            nonces,
            settings.manual_test_mode,
        );
        let allocation = AllocationTrigger::new(
            serials.clone(),
            orders.clone(),
            media.clone(),
            publisher.clone(),
        );

        Self {
            settings,
            serials,
            orders,
            pages,
            media,
            notices,
            publisher,
            registrar,
            allocation,
        }
    }
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

fn status_of(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::UnsupportedImageType(_) => StatusCode::BAD_REQUEST,
        Error::Authorization(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::DuplicateSerial(_) | Error::SerialAlreadyRegistered(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError {
            status: status_of(&err),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn html_page(status: StatusCode, body: &str) -> Response {
    (
        status,
        Html(format!(
            "<!DOCTYPE html><html><body><p>{}</p></body></html>",
            escape_html(body)
        )),
    )
        .into_response()
}

fn registration_path(order_id: u64) -> String {
    format!("/orders/{}/registration", order_id)
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.serials.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "service": "registration-service"
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "service": "registration-service",
                "error": e.to_string()
            })),
        )
            .into_response(),
    }
}

/// Receive an order from the shop and allocate serials once it is completed
pub async fn order_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AllocationReport>, ApiError> {
    if let Some(secret) = &state.settings.webhook_secret {
        let signature = headers
            .get(webhook::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Err(e) = webhook::verify(secret, &body, signature) {
            warn!("Rejected order webhook: {}", e);
            return Err(e.into());
        }
    }

    let order: Order = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("Invalid order payload: {}", e)))?;

    info!(
        "Received order {} ({:?}) with {} items",
        order.id,
        order.status,
        order.items.len()
    );

    let stored = state.orders.upsert(&order).await?;
    let report = state.allocation.on_order_completed(&stored).await?;

    Ok(Json(report))
}

/// Registration forms for every line item of an order
pub async fn order_form_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(order_id): Path<u64>,
) -> Result<Response, ApiError> {
    let user_id = match ctx.require_user() {
        Ok(id) => id,
        Err(e) => return Ok(html_page(StatusCode::FORBIDDEN, &e.notice())),
    };

    let Some(order) = state
        .orders
        .get(order_id)
        .await?
        .filter(|order| order.user_id == user_id)
    else {
        return Ok(html_page(
            StatusCode::NOT_FOUND,
            &Error::NotFound(format!("Order #{}", order_id)).notice(),
        ));
    };

    let notice = state.notices.take(user_id).await?;

    let items: Vec<ItemForm> = order
        .items
        .iter()
        .map(|item| ItemForm {
            order_id,
            item_id: item.item_id,
            product_name: item.product_name.clone(),
            token: state.registrar.issue_token(item.item_id, user_id),
            registration: item.registration.clone(),
            image_url: item
                .registration
                .customer_image
                .as_deref()
                .and_then(|key| state.media.url(key)),
            page_url: order
                .activation_pages
                .get(&item.item_id)
                .map(|page_id| state.publisher.url(*page_id)),
        })
        .collect();

    Ok(Html(form::render_order_forms(order_id, notice.as_ref(), &items)).into_response())
}

/// Operator form for registering without an order
pub async fn manual_form_handler(State(state): State<Arc<AppState>>) -> Response {
    if !state.settings.manual_test_mode {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(form::render_manual_form(None)).into_response()
}

/// Registration form fields as posted
#[derive(Debug, Default)]
struct PostedRegistration {
    order_id: u64,
    item_id: u64,
    token: Option<String>,
    name: String,
    phone: String,
    vital_info: String,
    serial: String,
    image: Option<UploadedImage>,
    submitted: bool,
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| bad_request(format!("Unreadable form field: {}", e)))
}

impl PostedRegistration {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut posted = PostedRegistration::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| bad_request(format!("Malformed form data: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "gds_order_id" => {
                    posted.order_id = field_text(field).await?.trim().parse().unwrap_or(0)
                }
                "gds_item_id" => {
                    posted.item_id = field_text(field).await?.trim().parse().unwrap_or(0)
                }
                "gds_nonce" => posted.token = Some(field_text(field).await?),
                "gds_name" => posted.name = field_text(field).await?,
                "gds_phone" => posted.phone = field_text(field).await?,
                "gds_vital_info" => posted.vital_info = field_text(field).await?,
                "gds_serial" => posted.serial = field_text(field).await?,
                "gds_image" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("Unreadable upload: {}", e)))?;

                    // browsers send an empty part when no file was chosen
                    if !file_name.is_empty() {
                        posted.image = Some(UploadedImage {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        });
                    }
                }
                SUBMIT_MARKER => posted.submitted = true,
                _ => {}
            }
        }

        Ok(posted)
    }
}

/// Handle a registration form submission
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let posted = PostedRegistration::read(multipart).await?;
    if !posted.submitted {
        return Err(bad_request("Missing registration submit marker"));
    }

    let target = RegistrationTarget::from_wire(
        posted.order_id,
        posted.item_id,
        state.settings.manual_test_product_id,
    );
    let submission = RegistrationSubmission {
        target,
        serial: posted.serial,
        name: posted.name,
        phone: posted.phone,
        vital_info: posted.vital_info,
        image: posted.image,
        token: posted.token,
    };

    match (state.registrar.register(&ctx, submission).await, target) {
        (Ok(registered), RegistrationTarget::ManualTest { .. }) => {
            Ok(Redirect::to(&registered.page_url).into_response())
        }
        (Ok(_), RegistrationTarget::OrderBound { order_id, .. }) => {
            let user_id = ctx.acting_user();
            state
                .notices
                .push(user_id, Notice::success(SUCCESS_NOTICE))
                .await?;
            Ok(Redirect::to(&registration_path(order_id)).into_response())
        }
        (Err(e), RegistrationTarget::ManualTest { .. }) => {
            if !e.is_client_error() {
                error!("Manual registration failed: {}", e);
            }
            let page = form::render_manual_form(Some(&e.notice()));
            Ok((status_of(&e), Html(page)).into_response())
        }
        (Err(e @ Error::Authorization(_)), RegistrationTarget::OrderBound { .. }) => {
            warn!("Rejected registration from {:?}: {}", ctx.user_id, e);
            Ok(html_page(StatusCode::FORBIDDEN, &e.notice()))
        }
        (Err(e), RegistrationTarget::OrderBound { order_id, .. }) => {
            if !e.is_client_error() {
                error!("Registration for order {} failed: {}", order_id, e);
            }
            state
                .notices
                .push(ctx.acting_user(), Notice::error(e.notice()))
                .await?;
            Ok(Redirect::to(&registration_path(order_id)).into_response())
        }
    }
}

/// Serve a published page
pub async fn page_handler(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<u64>,
) -> Result<Response, ApiError> {
    match state.pages.get(page_id).await? {
        Some(page) => Ok(Html(render_document(&page)).into_response()),
        None => Ok(html_page(
            StatusCode::NOT_FOUND,
            &Error::NotFound("Page".to_string()).notice(),
        )),
    }
}

/// QR-code target: redirect to the newest page of a serial
pub async fn serial_page_handler(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<Response, ApiError> {
    match state.pages.latest_for_serial(&serial).await? {
        Some(page) => Ok(Redirect::to(&state.publisher.url(page.id)).into_response()),
        None => Ok(html_page(
            StatusCode::NOT_FOUND,
            &Error::NotFound(format!("Serial {}", serial)).notice(),
        )),
    }
}
